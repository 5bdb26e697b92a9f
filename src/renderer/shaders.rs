//! 着色器编译
//!
//! 渲染核心只消费编译后的着色器字节码，编译本身通过 `ShaderCompiler` trait 完成。
//!
//! # 实现方式
//!
//! `WgslCompiler` 使用 naga 解析并校验 WGSL 源码，确认入口点存在且阶段正确，
//! 校验通过的源码本身即作为字节码交给后端（wgpu 直接接受 WGSL）。
//!
//! # 资源绑定约定
//!
//! 所有资源都位于 `@group(0)`，binding 序号等于管线声明 `ResourceBinding` 的顺序。

use std::sync::Arc;

use tracing::{debug, error};

use crate::core::error::{GraphicsError, Result};
use crate::renderer::pipeline::{CompiledShader, ShaderStage};

/// 顶点着色器入口
pub const VERTEX_ENTRY: &str = "vs_main";

/// 像素着色器入口
pub const PIXEL_ENTRY: &str = "ps_main";

/// 编译器的原始输出
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    pub bytecode: Vec<u8>,
    /// 请求的入口点是否存在且属于请求的阶段
    pub entry_point_valid: bool,
    /// 编译器诊断输出
    pub error_log: Option<String>,
}

impl CompileOutput {
    fn failed(log: impl Into<String>) -> Self {
        Self {
            bytecode: Vec::new(),
            entry_point_valid: false,
            error_log: Some(log.into()),
        }
    }
}

/// 着色器编译器接口
pub trait ShaderCompiler {
    fn compile(&self, source: &str, stage: ShaderStage, entry_point: &str) -> CompileOutput;
}

impl CompiledShader {
    /// 从编译输出构造，失败时返回带诊断日志的 `CompileFailed`
    pub fn from_output(output: CompileOutput, stage: ShaderStage, entry_point: &str) -> Result<Self> {
        if !output.entry_point_valid || output.bytecode.is_empty() {
            let log = output
                .error_log
                .unwrap_or_else(|| format!("entry point '{}' produced no bytecode", entry_point));
            error!(entry_point, ?stage, "Shader compilation failed");
            return Err(GraphicsError::CompileFailed {
                entry_point: entry_point.to_string(),
                log,
            }
            .into());
        }

        Ok(Self {
            stage,
            entry_point: entry_point.to_string(),
            bytecode: Arc::from(output.bytecode),
        })
    }

    /// 字节码按 UTF-8 解释的源码（WGSL 后端使用）
    pub fn source_text(&self) -> Result<&str> {
        std::str::from_utf8(&self.bytecode).map_err(|e| {
            GraphicsError::CompileFailed {
                entry_point: self.entry_point.clone(),
                log: format!("bytecode is not WGSL text: {}", e),
            }
            .into()
        })
    }
}

/// 基于 naga 的 WGSL 编译器
#[derive(Debug, Default, Clone, Copy)]
pub struct WgslCompiler;

impl WgslCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl ShaderCompiler for WgslCompiler {
    fn compile(&self, source: &str, stage: ShaderStage, entry_point: &str) -> CompileOutput {
        let module = match naga::front::wgsl::parse_str(source) {
            Ok(module) => module,
            Err(e) => return CompileOutput::failed(e.emit_to_string(source)),
        };

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        if let Err(e) = validator.validate(&module) {
            return CompileOutput::failed(format!("Validation error: {}", e));
        }

        let naga_stage = match stage {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Pixel => naga::ShaderStage::Fragment,
        };

        let found = module
            .entry_points
            .iter()
            .any(|ep| ep.name == entry_point && ep.stage == naga_stage);
        if !found {
            return CompileOutput::failed(format!(
                "Entry point '{}' not found for stage {:?}",
                entry_point, stage
            ));
        }

        CompileOutput {
            bytecode: source.as_bytes().to_vec(),
            entry_point_valid: true,
            error_log: None,
        }
    }
}

/// 内置着色器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinShader {
    Triangle,
    TexturedQuad,
    Cubes,
}

impl BuiltinShader {
    pub const ALL: [BuiltinShader; 3] = [
        BuiltinShader::Triangle,
        BuiltinShader::TexturedQuad,
        BuiltinShader::Cubes,
    ];

    pub fn source(&self) -> &'static str {
        match self {
            BuiltinShader::Triangle => include_str!("shaders/triangle.wgsl"),
            BuiltinShader::TexturedQuad => include_str!("shaders/textured_quad.wgsl"),
            BuiltinShader::Cubes => include_str!("shaders/cubes.wgsl"),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinShader::Triangle => "triangle",
            BuiltinShader::TexturedQuad => "textured_quad",
            BuiltinShader::Cubes => "cubes",
        }
    }
}

/// 编译一对顶点/像素着色器
pub fn compile_program<C: ShaderCompiler + ?Sized>(
    compiler: &C,
    source: &str,
) -> Result<(CompiledShader, CompiledShader)> {
    let vertex = CompiledShader::from_output(
        compiler.compile(source, ShaderStage::Vertex, VERTEX_ENTRY),
        ShaderStage::Vertex,
        VERTEX_ENTRY,
    )?;
    let pixel = CompiledShader::from_output(
        compiler.compile(source, ShaderStage::Pixel, PIXEL_ENTRY),
        ShaderStage::Pixel,
        PIXEL_ENTRY,
    )?;
    Ok((vertex, pixel))
}

/// 编译内置着色器
pub fn compile_builtin<C: ShaderCompiler + ?Sized>(
    compiler: &C,
    shader: BuiltinShader,
) -> Result<(CompiledShader, CompiledShader)> {
    let program = compile_program(compiler, shader.source())?;
    debug!(shader = shader.name(), "Shader program compiled");
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RenderError;

    #[test]
    fn test_builtin_shaders_compile() {
        let compiler = WgslCompiler::new();
        for shader in BuiltinShader::ALL {
            let (vs, ps) = compile_builtin(&compiler, shader).unwrap();
            assert_eq!(vs.stage, ShaderStage::Vertex);
            assert_eq!(ps.entry_point, PIXEL_ENTRY);
            assert_eq!(vs.source_text().unwrap(), shader.source());
        }
    }

    #[test]
    fn test_syntax_error_carries_log() {
        let broken = "@vertex fn vs_main( -> @builtin(position) vec4<f32> { }";
        let err = compile_program(&WgslCompiler::new(), broken).unwrap_err();
        match err {
            RenderError::Graphics(GraphicsError::CompileFailed { entry_point, log }) => {
                assert_eq!(entry_point, VERTEX_ENTRY);
                assert!(!log.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(compile_program(&WgslCompiler::new(), broken).unwrap_err().exit_code(), 3);
    }

    #[test]
    fn test_entry_point_must_match_stage() {
        let source = BuiltinShader::Triangle.source();
        let output = WgslCompiler::new().compile(source, ShaderStage::Pixel, VERTEX_ENTRY);
        assert!(!output.entry_point_valid);
        assert!(output.error_log.unwrap().contains(VERTEX_ENTRY));
    }

    #[test]
    fn test_empty_bytecode_is_rejected() {
        let output = CompileOutput {
            bytecode: Vec::new(),
            entry_point_valid: true,
            error_log: None,
        };
        assert!(CompiledShader::from_output(output, ShaderStage::Vertex, "main").is_err());
    }
}
