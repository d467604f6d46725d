use serde::{Deserialize, Serialize};
use std::fmt;

pub mod robot;

pub use robot::{resolve_round, Die, FixedDie, RandomDie, Robot};

pub const WIN_POINTS: i32 = 12;
pub const DRAW_POINTS: i32 = 5;
pub const LOSS_POINTS: i32 = 1;
pub const WIN_SCRAP: i32 = 25;
pub const DRAW_SCRAP: i32 = 10;
pub const LOSS_SCRAP: i32 = 5;
pub const BASE_HEALTH: i32 = 50;
pub const MAX_TURNS: u32 = 19;
pub const PROMOTION_WINDOW_SECS: u64 = 15;
pub const DEFAULT_READ_WINDOW_SECS: u64 = 60;
pub const IDLE_READ_WINDOW_SECS: u64 = 180;
pub const PRIORITY_BOOST: i32 = 100;

/// Line pushed to a client whose matchmaking wait expired without a pairing.
pub const NULL_TURN_NOTICE: &str = ",,,,,,,,,";

/// A turn action chosen by a client. Anything a client sends that is not one
/// of these wire names is normalized to `Forfeit` at the comms boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Attack,
    Defend,
    Heal,
    Charge,
    Forfeit,
}

impl Action {
    pub fn from_wire(field: &str) -> Action {
        match field.trim() {
            "attack" => Action::Attack,
            "defend" => Action::Defend,
            "heal" => Action::Heal,
            "charge" => Action::Charge,
            _ => Action::Forfeit,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Action::Attack => "attack",
            Action::Defend => "defend",
            Action::Heal => "heal",
            Action::Charge => "charge",
            Action::Forfeit => "forfeit",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// One side's view of the match result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    None,
    Win,
    Lose,
    Draw,
    Forfeit,
}

impl Outcome {
    pub fn from_wire(field: &str) -> Option<Outcome> {
        match field.trim() {
            "none" => Some(Outcome::None),
            "win" => Some(Outcome::Win),
            "lose" => Some(Outcome::Lose),
            "draw" => Some(Outcome::Draw),
            "forfeit" => Some(Outcome::Forfeit),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Outcome::None => "none",
            Outcome::Win => "win",
            Outcome::Lose => "lose",
            Outcome::Draw => "draw",
            Outcome::Forfeit => "forfeit",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Per-turn status broadcast, one line per side per round. The trailing comma
/// is part of the wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub own_health: i32,
    pub opponent_health: i32,
    pub outcome: Outcome,
    pub charge_cooldown: i32,
    pub heal_cooldown: i32,
    pub turn: u32,
    pub opponent_action: Option<Action>,
}

impl StatusLine {
    pub fn to_wire(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},",
            self.own_health,
            self.opponent_health,
            self.outcome.as_wire(),
            self.charge_cooldown,
            self.heal_cooldown,
            self.turn,
            self.opponent_action.map(|a| a.as_wire()).unwrap_or("")
        )
    }

    pub fn parse(line: &str) -> Option<StatusLine> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
        if fields.len() < 7 {
            return None;
        }
        Some(StatusLine {
            own_health: fields[0].trim().parse().ok()?,
            opponent_health: fields[1].trim().parse().ok()?,
            outcome: Outcome::from_wire(fields[2])?,
            charge_cooldown: fields[3].trim().parse().ok()?,
            heal_cooldown: fields[4].trim().parse().ok()?,
            turn: fields[5].trim().parse().ok()?,
            opponent_action: match fields[6].trim() {
                "" => None,
                other => Some(Action::from_wire(other)),
            },
        })
    }
}
