//! 只清屏的场景

use crate::core::error::Result;
use crate::core::math::Color;
use crate::renderer::command::Frame;
use crate::renderer::device::Device;
use crate::renderer::resource::RenderTargetView;
use crate::scene::{Scene, SceneSetup};

/// 每帧只清除颜色目标，不创建任何资源
#[derive(Debug)]
pub struct ClearScene {
    clear_color: Color,
}

impl Scene for ClearScene {
    fn name(&self) -> &'static str {
        "clear"
    }

    fn create<D: Device + ?Sized>(setup: &mut SceneSetup<'_, D>) -> Result<Self> {
        Ok(Self {
            clear_color: setup.clear_color_or(Color::RED),
        })
    }

    fn clear_color(&self) -> Color {
        self.clear_color
    }

    fn record<D: Device + ?Sized>(&mut self, _frame: &mut Frame<'_, D>, _target: &RenderTargetView) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scene::SceneKind;
    use crate::scene::testing::{config, Harness};

    #[test]
    fn test_each_present_shows_the_clear_color() {
        let mut harness = Harness::<ClearScene>::new(&config(SceneKind::Clear)).unwrap();
        assert!(harness.device.created().len() == 1, "only the swap chain exists");

        for _ in 0..3 {
            let stats = harness.frame().unwrap();
            assert_eq!(stats.draw_count, 0);
        }

        let presents = harness.device.presents();
        assert_eq!(presents.len(), 3);
        assert!(presents.iter().all(|p| p.marker == [255, 0, 0, 255]));
        assert_eq!(presents.iter().map(|p| p.image_index).collect::<Vec<_>>(), vec![0, 1, 0]);
        harness.finish();
    }

    #[test]
    fn test_presents_advance_once_per_frame() {
        let mut harness = Harness::<ClearScene>::new(&config(SceneKind::Clear)).unwrap();
        let colors = [Color::RED, Color::GREEN, Color::BLUE, Color::WHITE];

        for (i, color) in colors.into_iter().enumerate() {
            harness.scene.clear_color = color;
            let stats = harness.frame().unwrap();
            assert_eq!(stats.frame_index, i as u64);
        }

        let shown: Vec<(u32, [u8; 4])> = harness
            .device
            .presents()
            .iter()
            .map(|p| (p.image_index, p.marker))
            .collect();
        assert_eq!(
            shown,
            vec![
                (0, [255, 0, 0, 255]),
                (1, [0, 255, 0, 255]),
                (0, [0, 0, 255, 255]),
                (1, [255, 255, 255, 255]),
            ]
        );
        assert_eq!(harness.chain.current_index(), 0);
        harness.finish();
    }
}
