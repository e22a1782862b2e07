//! The fixed cast of the Elsinore scenario.
//!
//! Character display names arrive verbatim in protocol event titles; slot
//! stems key the per-character memory and goal fields on the wire. The
//! mapping between the two is a closed bijection, so an unrecognized name
//! is an explicit `None` rather than a silent miss.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The player's display name as it appears in the transcript.
pub const PLAYER_NAME: &str = "哈姆雷特";

/// Caller identity reported to the dialogue service.
pub const PLAYER_USER: &str = "hamlet";

/// Query text that signals the end of a turn sequence.
pub const END_TURN_QUERY: &str = "结束对话";

/// Title of the memory-system completion event.
pub const MEMORY_TAG: &str = "记忆系统";

/// Title suffix of per-character goal completion events.
pub const GOAL_SUFFIX: &str = "目标";

/// A member of the scenario's cast (everyone but the player).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Character {
    /// 鬼魂 — the old king's ghost.
    Ghost,
    /// 奥菲利娅
    Ophelia,
    /// 波洛涅斯
    Polonius,
    /// 克劳狄斯 — the usurper king.
    Claudius,
    /// 霍拉旭
    Horatio,
    /// 王后
    Queen,
    /// 雷欧提斯
    Laertes,
}

impl Character {
    /// Every cast member, in slot order.
    pub const ALL: [Character; 7] = [
        Character::Ghost,
        Character::Ophelia,
        Character::Polonius,
        Character::Claudius,
        Character::Horatio,
        Character::Queen,
        Character::Laertes,
    ];

    /// The display name used in event titles and the transcript.
    pub fn display_name(&self) -> &'static str {
        match self {
            Character::Ghost => "鬼魂",
            Character::Ophelia => "奥菲利娅",
            Character::Polonius => "波洛涅斯",
            Character::Claudius => "克劳狄斯",
            Character::Horatio => "霍拉旭",
            Character::Queen => "王后",
            Character::Laertes => "雷欧提斯",
        }
    }

    /// The canonical slot stem keying this character's wire fields.
    pub fn slot(&self) -> &'static str {
        match self {
            Character::Ghost => "ghost",
            Character::Ophelia => "aofeiliya",
            Character::Polonius => "boluoniesi",
            Character::Claudius => "kelaodisi",
            Character::Horatio => "huolaxu",
            Character::Queen => "wanghou",
            Character::Laertes => "leioutisi",
        }
    }

    /// Wire key for this character's cumulative memory.
    pub fn memory_key(&self) -> String {
        format!("{}_memory", self.slot())
    }

    /// Wire key for this character's current goal.
    pub fn goal_key(&self) -> String {
        format!("{}_goal", self.slot())
    }

    /// Resolve a display name to a cast member.
    pub fn from_display_name(name: &str) -> Option<Character> {
        Character::ALL
            .iter()
            .copied()
            .find(|c| c.display_name() == name)
    }
}

impl fmt::Display for Character {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
