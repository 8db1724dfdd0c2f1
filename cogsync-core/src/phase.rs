use crate::marker::MarkerCode;
use serde::{Deserialize, Serialize};

/// Defines session phases and behavior
pub trait Phase: Copy + Clone + PartialEq + Send + Sync + std::fmt::Debug + Default {
    fn allows_input(&self) -> bool;
    fn next(&self) -> Option<Self>;

    fn is_timed(&self) -> bool {
        false
    }
    fn is_block(&self) -> bool {
        false
    }
    fn is_terminal(&self) -> bool {
        false
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionPhase {
    #[default]
    Idle,
    Baseline,
    Break,
    Block(u32),
    Interstitial,
    Complete,
    Aborted,
}

impl SessionPhase {
    /// Number of task blocks in a session.
    pub const BLOCKS: u32 = 2;

    /// Phases a completed session passes through, in order.
    pub fn sequence() -> Vec<SessionPhase> {
        use SessionPhase::*;
        vec![Baseline, Break, Block(1), Interstitial, Block(2)]
    }

    /// Marker emitted when the phase starts. Terminal and idle phases have none.
    pub fn start_marker(&self) -> Option<MarkerCode> {
        use SessionPhase::*;
        match self {
            Baseline => Some(MarkerCode::BASELINE_START),
            Break => Some(MarkerCode::BREAK_START),
            Interstitial => Some(MarkerCode::INTERSTITIAL_START),
            Block(n) => Some(MarkerCode::block_start(*n)),
            Idle | Complete | Aborted => None,
        }
    }

    pub fn label(&self) -> String {
        use SessionPhase::*;
        match self {
            Idle => "Idle".to_string(),
            Baseline => "Control Recording (Baseline)".to_string(),
            Break => "Break".to_string(),
            Block(1) => "Attention Test".to_string(),
            Block(n) => format!("Attention Test {n} (post-exposure)"),
            Interstitial => "Exposure Phase".to_string(),
            Complete => "Complete".to_string(),
            Aborted => "Aborted".to_string(),
        }
    }

    pub fn block_number(&self) -> Option<u32> {
        match self {
            SessionPhase::Block(n) => Some(*n),
            _ => None,
        }
    }
}

impl Phase for SessionPhase {
    fn allows_input(&self) -> bool {
        self.is_block()
    }

    fn next(&self) -> Option<Self> {
        use SessionPhase::*;
        Some(match self {
            Idle => Baseline,
            Baseline => Break,
            Break => Block(1),
            Block(1) => Interstitial,
            Interstitial => Block(2),
            Block(_) => Complete,
            Complete | Aborted => return None,
        })
    }

    fn is_timed(&self) -> bool {
        matches!(self, Self::Baseline | Self::Break | Self::Interstitial)
    }

    fn is_block(&self) -> bool {
        matches!(self, Self::Block(_))
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Aborted)
    }
}
