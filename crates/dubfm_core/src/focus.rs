//! 音频焦点仲裁

/// 系统音频焦点变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    Gain,
    Loss,
    LossTransient,
    LossTransientCanDuck,
}

impl FocusChange {
    /// Android `AudioManager.AUDIOFOCUS_*` 数值
    pub fn from_android(code: i32) -> Option<Self> {
        match code {
            // GAIN, GAIN_TRANSIENT, GAIN_TRANSIENT_MAY_DUCK, GAIN_TRANSIENT_EXCLUSIVE
            1..=4 => Some(FocusChange::Gain),
            -1 => Some(FocusChange::Loss),
            -2 => Some(FocusChange::LossTransient),
            -3 => Some(FocusChange::LossTransientCanDuck),
            _ => None,
        }
    }
}

/// 平台音频焦点
pub trait AudioFocusManager: Send {
    /// 请求焦点，返回是否获准
    fn request_focus(&mut self) -> bool;
    fn abandon_focus(&mut self);
}

/// 仲裁结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusDecision {
    Ignore,
    Stop,
    Duck,
    /// 恢复满音量；`resume` 表示此前因短暂失去焦点而停止
    Regained { resume: bool },
}

pub struct AudioFocusArbiter {
    manager: Box<dyn AudioFocusManager>,
    granted: bool,
    resume_on_gain: bool,
}

impl AudioFocusArbiter {
    pub fn new(manager: Box<dyn AudioFocusManager>) -> Self {
        Self {
            manager,
            granted: false,
            resume_on_gain: false,
        }
    }

    pub fn resume_pending(&self) -> bool {
        self.resume_on_gain
    }

    pub fn request(&mut self) -> bool {
        self.granted = self.manager.request_focus();
        if !self.granted {
            log::warn!("[Focus] audio focus request denied, playing anyway");
        }
        self.granted
    }

    /// 释放焦点；未持有时不调用平台
    pub fn abandon(&mut self) {
        if self.granted {
            self.manager.abandon_focus();
            self.granted = false;
        }
    }

    pub fn clear_resume(&mut self) {
        self.resume_on_gain = false;
    }

    pub fn on_change(&mut self, change: FocusChange, playing: bool) -> FocusDecision {
        match change {
            FocusChange::Loss => {
                self.resume_on_gain = false;
                if playing {
                    FocusDecision::Stop
                } else {
                    FocusDecision::Ignore
                }
            }
            FocusChange::LossTransient => {
                if playing {
                    self.resume_on_gain = true;
                    FocusDecision::Stop
                } else {
                    FocusDecision::Ignore
                }
            }
            FocusChange::LossTransientCanDuck => {
                if playing {
                    FocusDecision::Duck
                } else {
                    FocusDecision::Ignore
                }
            }
            FocusChange::Gain => {
                self.granted = true;
                FocusDecision::Regained {
                    resume: std::mem::take(&mut self.resume_on_gain),
                }
            }
        }
    }
}
