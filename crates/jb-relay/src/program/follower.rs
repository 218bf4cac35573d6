//! Stream followers: tail -f, watch, ping

use tracing::info;

use super::ProgramSignal;
use crate::keys::KeyEvent;

/// Ends on Ctrl-C
#[derive(Debug, Clone, Copy, Default)]
pub struct FollowerMachine;

impl FollowerMachine {
    pub(super) fn feed(&mut self, key: &KeyEvent) -> ProgramSignal {
        if *key == KeyEvent::CtrlC {
            info!("Ctrl-C ended follower");
            ProgramSignal::Exit
        } else {
            ProgramSignal::Stay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::classify;

    #[test]
    fn test_only_ctrl_c_exits() {
        let mut m = FollowerMachine;
        assert_eq!(m.feed(&classify(b"q")), ProgramSignal::Stay);
        assert_eq!(m.feed(&classify(b"\r")), ProgramSignal::Stay);
        assert_eq!(m.feed(&classify(b"\x03")), ProgramSignal::Exit);
    }
}
