use log::{debug, error};
use unm_audio::AudioEngine;
use unm_tools::{Edge, RefFlag};

/// 外部可见的激活状态变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActivationChange {
    Deactivated,
    Reactivated,
}

impl ActivationChange {
    /// 失活时暂停全部音频，恢复激活时继续
    pub(crate) fn apply(self, audio: &mut AudioEngine) {
        match self {
            ActivationChange::Deactivated => {
                debug!("Window deactivated, pausing audio");
                audio.pause_all();
            }
            ActivationChange::Reactivated => {
                debug!("Window reactivated, resuming audio");
                audio.resume_all();
            }
        }
    }
}

/// 窗口失活的多个来源（失焦、挂起、游戏内设置界面）共用一个计数，
/// 只有计数跨越 0 和 1 时才产生变化。
#[derive(Debug, Default)]
pub(crate) struct Activation {
    flag: RefFlag,
    focus_lost: bool,
    suspended: bool,
}

impl Activation {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_deactivated(&self) -> bool {
        self.flag.is_set()
    }

    /// 由游戏逻辑直接配对调用，计数不足时记录错误
    pub(crate) fn set_window_deactivated(&mut self, deactivated: bool) -> Option<ActivationChange> {
        if deactivated {
            return match self.flag.acquire() {
                Edge::Raised => Some(ActivationChange::Deactivated),
                _ => None,
            };
        }

        match self.flag.release() {
            Ok(Edge::Lowered) => Some(ActivationChange::Reactivated),
            Ok(_) => None,
            Err(err) => {
                error!("Unbalanced window activation: {err}");
                None
            }
        }
    }

    /// 平台会重复报告焦点状态，这里每个来源最多计一次
    pub(crate) fn on_focus_changed(&mut self, focused: bool) -> Option<ActivationChange> {
        if self.focus_lost == !focused {
            return None;
        }
        self.focus_lost = !focused;
        self.set_window_deactivated(!focused)
    }

    pub(crate) fn on_suspend_changed(&mut self, suspended: bool) -> Option<ActivationChange> {
        if self.suspended == suspended {
            return None;
        }
        self.suspended = suspended;
        self.set_window_deactivated(suspended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_sources_change_only_at_edges() {
        let mut activation = Activation::new();
        assert_eq!(activation.on_focus_changed(false), Some(ActivationChange::Deactivated));
        assert_eq!(activation.on_suspend_changed(true), None);
        assert_eq!(activation.set_window_deactivated(true), None);

        assert_eq!(activation.on_focus_changed(true), None);
        assert_eq!(activation.on_suspend_changed(false), None);
        assert!(activation.is_deactivated());
        assert_eq!(activation.set_window_deactivated(false), Some(ActivationChange::Reactivated));
        assert!(!activation.is_deactivated());
    }

    #[test]
    fn repeated_focus_reports_are_ignored() {
        let mut activation = Activation::new();
        assert_eq!(activation.on_focus_changed(true), None);
        assert_eq!(activation.on_focus_changed(false), Some(ActivationChange::Deactivated));
        assert_eq!(activation.on_focus_changed(false), None);
        assert_eq!(activation.on_focus_changed(true), Some(ActivationChange::Reactivated));
    }

    #[test]
    fn unbalanced_release_does_not_flip_state() {
        let mut activation = Activation::new();
        assert_eq!(activation.set_window_deactivated(false), None);
        assert!(!activation.is_deactivated());
        assert_eq!(activation.set_window_deactivated(true), Some(ActivationChange::Deactivated));
    }
}
