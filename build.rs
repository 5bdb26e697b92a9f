/// Build script for render_scratch
///
/// # Shader Strategy:
/// - WGSL sources are embedded with `include_str!` and validated at startup by naga
fn main() {
    // Trigger rebuild if shader files change
    println!("cargo:rerun-if-changed=src/renderer/shaders/triangle.wgsl");
    println!("cargo:rerun-if-changed=src/renderer/shaders/textured_quad.wgsl");
    println!("cargo:rerun-if-changed=src/renderer/shaders/cubes.wgsl");
}
