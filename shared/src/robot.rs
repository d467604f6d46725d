//! Robot combat state and the deterministic round-resolution rules.
//!
//! A robot's attack and defend stats come from the parts a player picked for
//! the match. Both special moves (charged attack and heal) run on independent
//! cooldowns; a fired special locks itself out for two rounds. All arithmetic
//! is integer and deterministic given a fixed [`Die`], which is what the
//! combat tests rely on.

use crate::{Action, BASE_HEALTH};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of the 1..=6 rolls added to attack, defend and heal values.
pub trait Die: Send + Sync {
    fn roll(&mut self) -> i32;
}

/// Production die seeded from OS entropy.
pub struct RandomDie(StdRng);

impl RandomDie {
    pub fn new() -> Self {
        RandomDie(StdRng::from_entropy())
    }
}

impl Default for RandomDie {
    fn default() -> Self {
        Self::new()
    }
}

impl Die for RandomDie {
    fn roll(&mut self) -> i32 {
        self.0.gen_range(1..=6)
    }
}

/// Die that cycles through a fixed sequence, for deterministic tests.
pub struct FixedDie {
    rolls: Vec<i32>,
    next: usize,
}

impl FixedDie {
    pub fn new(rolls: &[i32]) -> Self {
        assert!(!rolls.is_empty());
        FixedDie {
            rolls: rolls.to_vec(),
            next: 0,
        }
    }
}

impl Die for FixedDie {
    fn roll(&mut self) -> i32 {
        let value = self.rolls[self.next];
        self.next = (self.next + 1) % self.rolls.len();
        value
    }
}

#[derive(Debug, Clone)]
pub struct Robot {
    attack: i32,
    defend: i32,
    charge_cooldown: i32,
    heal_cooldown: i32,
    health: i32,
    max_health: i32,
    action: Option<Action>,
}

impl Robot {
    /// Builds a robot from summed part stats. Starting health intentionally
    /// exceeds `max_health`; the cap only applies when healing, so a robot's
    /// first heal can lower its current health.
    pub fn new(attack: i32, defend: i32) -> Self {
        Robot {
            attack,
            defend,
            charge_cooldown: 0,
            heal_cooldown: 0,
            health: BASE_HEALTH + defend * 2,
            max_health: BASE_HEALTH + defend,
            action: None,
        }
    }

    pub fn set_action(&mut self, action: Action) {
        self.action = Some(action);
    }

    pub fn action(&self) -> Option<Action> {
        self.action
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub fn health(&self) -> i32 {
        self.health
    }

    pub fn max_health(&self) -> i32 {
        self.max_health
    }

    pub fn attack_stat(&self) -> i32 {
        self.attack
    }

    pub fn defend_stat(&self) -> i32 {
        self.defend
    }

    pub fn charge_cooldown(&self) -> i32 {
        self.charge_cooldown
    }

    pub fn heal_cooldown(&self) -> i32 {
        self.heal_cooldown
    }

    /// Damage this robot deals this round, keyed by its own chosen action.
    /// Non-attacking actions deal nothing.
    pub fn attacks(&mut self, die: &mut dyn Die) -> i32 {
        match self.action {
            Some(Action::Charge) => self.charge_attack(die),
            Some(Action::Attack) => self.basic_attack(),
            _ => 0,
        }
    }

    /// Applies incoming damage, mitigated by this robot's own chosen action
    /// for the round. Attacking (or an unset action) leaves it defenceless.
    pub fn attacked_by(&mut self, incoming: i32, die: &mut dyn Die) {
        match self.action {
            Some(Action::Heal) => self.heal(incoming, die),
            Some(Action::Defend) => self.defends(incoming, die),
            _ => self.defenceless(incoming),
        }
    }

    fn basic_attack(&mut self) -> i32 {
        if self.heal_cooldown > 0 {
            self.heal_cooldown -= 1;
        }
        if self.charge_cooldown > 0 {
            self.charge_cooldown -= 1;
        }
        self.attack
    }

    fn charge_attack(&mut self, die: &mut dyn Die) -> i32 {
        if self.heal_cooldown > 0 {
            self.heal_cooldown -= 1;
        }
        if self.charge_cooldown < 1 {
            self.charge_cooldown = 2;
            return self.attack + die.roll();
        }
        self.charge_cooldown -= 1;
        self.attack
    }

    fn defends(&mut self, incoming: i32, die: &mut dyn Die) {
        if self.charge_cooldown > 0 {
            self.charge_cooldown -= 1;
        }
        if self.heal_cooldown > 0 {
            self.heal_cooldown -= 1;
        }
        let damage = incoming - self.defend - die.roll();
        if damage > 0 {
            self.health -= damage;
        }
    }

    fn heal(&mut self, incoming: i32, die: &mut dyn Die) {
        if self.charge_cooldown > 0 {
            self.charge_cooldown -= 1;
        }
        if self.heal_cooldown < 1 {
            self.heal_cooldown = 2;
            let restored = self.defend + die.roll();
            if self.health + restored < self.max_health {
                self.health += restored - incoming;
            } else {
                self.health = self.max_health - incoming;
            }
        } else {
            // Heal on cooldown falls back to a regular defend.
            self.defends(incoming, die);
        }
    }

    fn defenceless(&mut self, incoming: i32) {
        self.health -= incoming;
    }
}

/// Resolves one round between two robots. Both attack values are computed
/// first, then each side takes the other's damage mitigated by its own chosen
/// action, so the two actions are evaluated simultaneously.
pub fn resolve_round(a: &mut Robot, b: &mut Robot, die: &mut dyn Die) -> (i32, i32) {
    let dealt_by_a = a.attacks(die);
    let dealt_by_b = b.attacks(die);
    a.attacked_by(dealt_by_b, die);
    b.attacked_by(dealt_by_a, die);
    (dealt_by_a, dealt_by_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_robot_stats() {
        let robot = Robot::new(12, 4);
        assert_eq!(robot.health(), 58);
        assert_eq!(robot.max_health(), 54);
        assert_eq!(robot.attack_stat(), 12);
        assert_eq!(robot.charge_cooldown(), 0);
        assert_eq!(robot.heal_cooldown(), 0);
        assert!(robot.is_alive());
        assert_eq!(robot.action(), None);
    }

    #[test]
    fn test_starting_health_exceeds_max_so_first_heal_can_lower_it() {
        // Inherited arithmetic: health starts at 50 + 2*defend while the heal
        // cap is 50 + defend. An early heal against zero incoming damage
        // therefore clamps health DOWN to max_health.
        let mut robot = Robot::new(10, 5);
        assert!(robot.health() > robot.max_health());

        robot.set_action(Action::Heal);
        robot.attacked_by(0, &mut FixedDie::new(&[6]));
        assert_eq!(robot.health(), robot.max_health());
    }

    #[test]
    fn test_defend_never_raises_health() {
        for incoming in [0, 1, 5, 11, 12, 30] {
            let mut robot = Robot::new(10, 5);
            robot.set_action(Action::Defend);
            let before = robot.health();
            robot.attacked_by(incoming, &mut FixedDie::new(&[1]));
            assert!(
                robot.health() <= before,
                "defend raised health for incoming {}",
                incoming
            );
        }
    }

    #[test]
    fn test_defend_mitigates_by_stat_and_roll() {
        let mut robot = Robot::new(10, 5);
        robot.set_action(Action::Defend);
        robot.attacked_by(12, &mut FixedDie::new(&[3]));
        // damage = 12 - 5 - 3 = 4
        assert_eq!(robot.health(), 56);

        // Fully absorbed hits leave health untouched.
        robot.attacked_by(8, &mut FixedDie::new(&[3]));
        assert_eq!(robot.health(), 56);
    }

    #[test]
    fn test_heal_never_raises_health_above_max() {
        let mut robot = Robot::new(10, 5);
        robot.set_action(Action::Attack);
        robot.attacked_by(20, &mut FixedDie::new(&[1]));
        assert_eq!(robot.health(), 40);

        robot.set_action(Action::Heal);
        robot.attacked_by(0, &mut FixedDie::new(&[6]));
        // 40 + 5 + 6 < 55, plain heal applies.
        assert_eq!(robot.health(), 51);
        assert!(robot.health() <= robot.max_health());

        // Cooldown expires after two defend rounds, then the next heal clamps.
        robot.set_action(Action::Defend);
        robot.attacked_by(0, &mut FixedDie::new(&[1]));
        robot.attacked_by(0, &mut FixedDie::new(&[1]));
        robot.set_action(Action::Heal);
        robot.attacked_by(0, &mut FixedDie::new(&[6]));
        assert_eq!(robot.health(), robot.max_health());
    }

    #[test]
    fn test_heal_on_cooldown_falls_back_to_defend() {
        let mut robot = Robot::new(10, 5);
        robot.set_action(Action::Heal);
        robot.attacked_by(0, &mut FixedDie::new(&[2]));
        assert_eq!(robot.heal_cooldown(), 2);
        let after_first_heal = robot.health();

        // Second heal is locked out: incoming resolves as a defend instead.
        robot.attacked_by(20, &mut FixedDie::new(&[2]));
        assert_eq!(robot.health(), after_first_heal - (20 - 5 - 2));
        assert_eq!(robot.heal_cooldown(), 1);
    }

    #[test]
    fn test_charge_cooldown_cycle() {
        let mut die = FixedDie::new(&[4]);
        let mut robot = Robot::new(10, 5);
        robot.set_action(Action::Charge);

        assert_eq!(robot.attacks(&mut die), 14);
        assert_eq!(robot.charge_cooldown(), 2);

        // On cooldown the charge degrades to a base attack.
        assert_eq!(robot.attacks(&mut die), 10);
        assert_eq!(robot.charge_cooldown(), 1);
        assert_eq!(robot.attacks(&mut die), 10);
        assert_eq!(robot.charge_cooldown(), 0);

        assert_eq!(robot.attacks(&mut die), 14);
        assert_eq!(robot.charge_cooldown(), 2);
    }

    #[test]
    fn test_basic_attack_decrements_both_cooldowns() {
        let mut die = FixedDie::new(&[4]);
        let mut robot = Robot::new(10, 5);
        robot.set_action(Action::Charge);
        robot.attacks(&mut die);
        robot.set_action(Action::Heal);
        robot.attacked_by(0, &mut die);
        assert_eq!(robot.charge_cooldown(), 1);
        assert_eq!(robot.heal_cooldown(), 2);

        robot.set_action(Action::Attack);
        assert_eq!(robot.attacks(&mut die), 10);
        assert_eq!(robot.charge_cooldown(), 0);
        assert_eq!(robot.heal_cooldown(), 1);
    }

    #[test]
    fn test_attacker_takes_full_damage() {
        for action in [Action::Attack, Action::Charge, Action::Forfeit] {
            let mut robot = Robot::new(10, 5);
            robot.set_action(action);
            robot.attacked_by(13, &mut FixedDie::new(&[6]));
            assert_eq!(robot.health(), 47, "no mitigation expected for {}", action);
        }

        // An unset action is equally defenceless.
        let mut robot = Robot::new(10, 5);
        robot.attacked_by(13, &mut FixedDie::new(&[6]));
        assert_eq!(robot.health(), 47);
    }

    #[test]
    fn test_non_attacking_actions_deal_no_damage() {
        let mut die = FixedDie::new(&[3]);
        for action in [Action::Defend, Action::Heal, Action::Forfeit] {
            let mut robot = Robot::new(10, 5);
            robot.set_action(action);
            assert_eq!(robot.attacks(&mut die), 0);
        }
    }

    #[test]
    fn test_both_attack_trajectory_is_deterministic() {
        // A(12/4) starts at 58, B(10/6) at 62; both attack every round with a
        // fixed die, so every round costs A 10 and B 12.
        let mut a = Robot::new(12, 4);
        let mut b = Robot::new(10, 6);
        let mut die = FixedDie::new(&[3]);

        let expected = [(48, 50), (38, 38), (28, 26), (18, 14), (8, 2), (-2, -10)];
        for (health_a, health_b) in expected {
            a.set_action(Action::Attack);
            b.set_action(Action::Attack);
            assert_eq!(resolve_round(&mut a, &mut b, &mut die), (12, 10));
            assert_eq!((a.health(), b.health()), (health_a, health_b));
        }

        // Round six leaves both below zero with A ahead.
        assert!(!a.is_alive());
        assert!(!b.is_alive());
        assert!(a.health() > b.health());
    }

    #[test]
    fn test_fixed_die_cycles() {
        let mut die = FixedDie::new(&[1, 2]);
        assert_eq!(die.roll(), 1);
        assert_eq!(die.roll(), 2);
        assert_eq!(die.roll(), 1);
    }

    #[test]
    fn test_random_die_stays_in_range() {
        let mut die = RandomDie::new();
        for _ in 0..1000 {
            let roll = die.roll();
            assert!((1..=6).contains(&roll));
        }
    }
}
