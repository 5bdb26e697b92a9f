//! 每帧状态机
//!
//! 每一帧必须按以下顺序进行：清屏 → 绑定 → 绘制 → 呈现。
//!
//! ```text
//!            Begin              BindingsComplete         Draw
//!   Idle ──────────► FrameBegin ─────────────────► Bound ──────► Drawn(1) ──► Drawn(n)
//!    ▲                   │                           │              │
//!    │                   └────────── Present ────────┴──────────────┘
//!    │                                     │
//!    └──── Reset ◄──── Presented ◄─────────┘
//! ```
//!
//! 转换函数 `transition` 是纯函数，非法转换返回 `FrameError::InvalidTransition`。

use std::fmt;

use crate::core::error::FrameError;

/// 帧状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// 没有进行中的帧
    Idle,
    /// 已清屏，尚未完成全部绑定
    FrameBegin,
    /// 六类绑定均已满足
    Bound,
    /// 已发出 n 次绘制
    Drawn(u32),
    /// 已呈现
    Presented,
}

/// 驱动状态机的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    Begin,
    BindingsComplete,
    Draw,
    Present,
    Reset,
}

/// 状态转换
pub fn transition(from: FrameState, event: FrameEvent) -> Result<FrameState, FrameError> {
    use FrameEvent as E;
    use FrameState as S;

    let next = match (from, event) {
        (_, E::Reset) => S::Idle,
        (S::Idle, E::Begin) => S::FrameBegin,
        (S::FrameBegin | S::Bound, E::BindingsComplete) => S::Bound,
        // 帧中途重新绑定（例如第二个物体）不回退已绘制计数
        (S::Drawn(n), E::BindingsComplete) => S::Drawn(n),
        (S::Bound, E::Draw) => S::Drawn(1),
        (S::Drawn(n), E::Draw) => S::Drawn(n.saturating_add(1)),
        (S::FrameBegin | S::Bound | S::Drawn(_), E::Present) => S::Presented,
        (from, event) => return Err(FrameError::InvalidTransition { from, event }),
    };

    Ok(next)
}

impl FrameState {
    /// 是否处于帧内（已开始、未呈现）
    pub fn in_frame(&self) -> bool {
        matches!(self, FrameState::FrameBegin | FrameState::Bound | FrameState::Drawn(_))
    }

    /// 本帧已发出的绘制次数
    pub fn draw_count(&self) -> u32 {
        match self {
            FrameState::Drawn(n) => *n,
            _ => 0,
        }
    }
}

/// 绘制前必须满足的绑定类别
///
/// 第七步是绘制本身。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingCategory {
    /// 顶点缓冲 + 图元拓扑（索引缓冲可选）
    InputAssembly,
    /// 管线（着色器 + 输入布局）
    Shaders,
    /// 管线声明的所有常量缓冲、纹理、采样器
    ShaderResources,
    /// 视口
    Viewport,
    /// 渲染目标
    RenderTargets,
    /// 深度模板状态（可显式设置为管线默认）
    FixedFunction,
}

impl BindingCategory {
    /// 按协议顺序排列的全部类别
    pub const ALL: [BindingCategory; 6] = [
        BindingCategory::InputAssembly,
        BindingCategory::Shaders,
        BindingCategory::ShaderResources,
        BindingCategory::Viewport,
        BindingCategory::RenderTargets,
        BindingCategory::FixedFunction,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for BindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 绑定类别集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindingSet(u8);

impl BindingSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, category: BindingCategory) {
        self.0 |= category.bit();
    }

    pub fn contains(&self, category: BindingCategory) -> bool {
        self.0 & category.bit() != 0
    }

    /// 是否六类全部满足
    pub fn is_complete(&self) -> bool {
        BindingCategory::ALL.iter().all(|c| self.contains(*c))
    }

    /// 尚未满足的类别，按协议顺序
    pub fn missing(&self) -> Vec<BindingCategory> {
        BindingCategory::ALL
            .iter()
            .copied()
            .filter(|c| !self.contains(*c))
            .collect()
    }
}

impl FromIterator<BindingCategory> for BindingSet {
    fn from_iter<I: IntoIterator<Item = BindingCategory>>(iter: I) -> Self {
        let mut set = BindingSet::empty();
        for category in iter {
            set.insert(category);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_frame_sequence() {
        let mut state = FrameState::Idle;
        for event in [
            FrameEvent::Begin,
            FrameEvent::BindingsComplete,
            FrameEvent::Draw,
            FrameEvent::BindingsComplete,
            FrameEvent::Draw,
            FrameEvent::Present,
        ] {
            state = transition(state, event).unwrap();
        }
        assert_eq!(state, FrameState::Presented);

        // 呈现后必须先复位到 Idle 才能开始下一帧
        assert!(transition(state, FrameEvent::Begin).is_err());
        let state = transition(state, FrameEvent::Reset).unwrap();
        assert_eq!(state, FrameState::Idle);
        assert_eq!(transition(state, FrameEvent::Begin).unwrap(), FrameState::FrameBegin);
    }

    #[test]
    fn test_draw_counts_accumulate() {
        let state = transition(FrameState::Bound, FrameEvent::Draw).unwrap();
        assert_eq!(state, FrameState::Drawn(1));
        let state = transition(state, FrameEvent::BindingsComplete).unwrap();
        let state = transition(state, FrameEvent::Draw).unwrap();
        assert_eq!(state.draw_count(), 2);
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(transition(FrameState::Idle, FrameEvent::Draw).is_err());
        assert!(transition(FrameState::Idle, FrameEvent::Present).is_err());
        assert!(transition(FrameState::FrameBegin, FrameEvent::Draw).is_err());
        assert!(transition(FrameState::FrameBegin, FrameEvent::Begin).is_err());
        assert!(transition(FrameState::Presented, FrameEvent::Draw).is_err());
        assert!(transition(FrameState::Presented, FrameEvent::Present).is_err());
        assert!(transition(FrameState::Presented, FrameEvent::Begin).is_err());
    }

    #[test]
    fn test_clear_only_frame_may_present() {
        let state = transition(FrameState::FrameBegin, FrameEvent::Present).unwrap();
        assert_eq!(state, FrameState::Presented);
    }

    #[test]
    fn test_reset_from_anywhere() {
        for state in [FrameState::FrameBegin, FrameState::Drawn(3), FrameState::Presented] {
            assert_eq!(transition(state, FrameEvent::Reset).unwrap(), FrameState::Idle);
        }
    }

    #[test]
    fn test_binding_set_missing_in_protocol_order() {
        let set: BindingSet = [BindingCategory::Viewport, BindingCategory::Shaders]
            .into_iter()
            .collect();
        assert!(!set.is_complete());
        assert_eq!(
            set.missing(),
            vec![
                BindingCategory::InputAssembly,
                BindingCategory::ShaderResources,
                BindingCategory::RenderTargets,
                BindingCategory::FixedFunction,
            ]
        );

        let full: BindingSet = BindingCategory::ALL.into_iter().collect();
        assert!(full.is_complete());
        assert!(full.missing().is_empty());
    }
}
