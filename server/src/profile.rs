//! Profile-store collaborator: authentication, career stats and part lookups.
//!
//! The store is consulted at login, when a loadout is priced into attack and
//! defend stats, and when a finished match records its outcome. The server
//! core only sees the [`ProfileStore`] trait; the bundled [`MemoryStore`]
//! keeps everything in process and seeds itself from a JSON accounts file.
//! Store failures are surfaced to the operator but never decide a match.

use crate::error::ServerError;
use serde::{Deserialize, Serialize};
use shared::{DRAW_POINTS, LOSS_POINTS, WIN_POINTS};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

/// One player's persistent record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user: String,
    pub password: String,
    #[serde(default)]
    pub wins: i32,
    #[serde(default)]
    pub losses: i32,
    #[serde(default)]
    pub draws: i32,
    #[serde(default)]
    pub scrap: i32,
    /// Ids of the parts this player owns.
    #[serde(default)]
    pub parts: Vec<String>,
}

/// One robot part. A loadout picks one part per distinct slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub id: String,
    pub slot: String,
    pub attack: i32,
    pub defend: i32,
}

#[derive(Debug, Deserialize)]
struct AccountsFile {
    users: Vec<Profile>,
    parts: Vec<Part>,
}

/// Career points earned over a player's lifetime record.
pub fn career_points(profile: &Profile) -> i32 {
    profile.wins * WIN_POINTS + profile.draws * DRAW_POINTS + profile.losses * LOSS_POINTS
}

pub trait ProfileStore: Send + Sync {
    fn authenticate(&self, user: &str, password: &str) -> Result<Profile, ServerError>;
    fn profile(&self, user: &str) -> Result<Profile, ServerError>;
    fn increment_win(&self, user: &str) -> Result<(), ServerError>;
    fn increment_loss(&self, user: &str) -> Result<(), ServerError>;
    fn increment_draw(&self, user: &str) -> Result<(), ServerError>;
    fn award_scrap(&self, user: &str, amount: i32) -> Result<(), ServerError>;
    /// Sums attack and defend over the given part ids.
    fn get_attack_defend(&self, part_ids: &[String]) -> Result<(i32, i32), ServerError>;
    /// Number of distinct part slots; the declared loadout width.
    fn part_slots(&self) -> usize;
    fn part_count(&self) -> usize;
}

/// In-process store backed by a JSON accounts file.
pub struct MemoryStore {
    users: Mutex<HashMap<String, Profile>>,
    parts: HashMap<String, Part>,
    slots: usize,
}

impl MemoryStore {
    pub fn new(users: Vec<Profile>, parts: Vec<Part>) -> Self {
        let slots = parts
            .iter()
            .map(|part| part.slot.as_str())
            .collect::<HashSet<_>>()
            .len();
        MemoryStore {
            users: Mutex::new(
                users
                    .into_iter()
                    .map(|profile| (profile.user.clone(), profile))
                    .collect(),
            ),
            parts: parts.into_iter().map(|part| (part.id.clone(), part)).collect(),
            slots,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, ServerError> {
        let file: AccountsFile = serde_json::from_str(raw)?;
        Ok(Self::new(file.users, file.parts))
    }

    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    fn update<T>(
        &self,
        user: &str,
        apply: impl FnOnce(&mut Profile) -> T,
    ) -> Result<T, ServerError> {
        let mut users = self.users.lock().unwrap();
        users
            .get_mut(user)
            .map(apply)
            .ok_or(ServerError::AuthenticationFailure)
    }
}

impl ProfileStore for MemoryStore {
    fn authenticate(&self, user: &str, password: &str) -> Result<Profile, ServerError> {
        let users = self.users.lock().unwrap();
        match users.get(user) {
            Some(profile) if profile.password == password => Ok(profile.clone()),
            _ => Err(ServerError::AuthenticationFailure),
        }
    }

    fn profile(&self, user: &str) -> Result<Profile, ServerError> {
        let users = self.users.lock().unwrap();
        users
            .get(user)
            .cloned()
            .ok_or(ServerError::AuthenticationFailure)
    }

    fn increment_win(&self, user: &str) -> Result<(), ServerError> {
        self.update(user, |profile| profile.wins += 1)
    }

    fn increment_loss(&self, user: &str) -> Result<(), ServerError> {
        self.update(user, |profile| profile.losses += 1)
    }

    fn increment_draw(&self, user: &str) -> Result<(), ServerError> {
        self.update(user, |profile| profile.draws += 1)
    }

    fn award_scrap(&self, user: &str, amount: i32) -> Result<(), ServerError> {
        self.update(user, |profile| profile.scrap += amount)
    }

    fn get_attack_defend(&self, part_ids: &[String]) -> Result<(i32, i32), ServerError> {
        let mut attack = 0;
        let mut defend = 0;
        for id in part_ids {
            let part = self.parts.get(id).ok_or(ServerError::MalformedRequest)?;
            attack += part.attack;
            defend += part.defend;
        }
        Ok((attack, defend))
    }

    fn part_slots(&self) -> usize {
        self.slots
    }

    fn part_count(&self) -> usize {
        self.parts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> MemoryStore {
        MemoryStore::new(
            vec![
                Profile {
                    user: "alice".into(),
                    password: "secret".into(),
                    wins: 3,
                    losses: 2,
                    draws: 1,
                    scrap: 40,
                    parts: vec!["chassis-1".into(), "arm-1".into()],
                },
                Profile {
                    user: "bob".into(),
                    password: "hunter2".into(),
                    wins: 0,
                    losses: 0,
                    draws: 0,
                    scrap: 0,
                    parts: vec!["chassis-2".into(), "arm-2".into()],
                },
            ],
            vec![
                Part {
                    id: "chassis-1".into(),
                    slot: "chassis".into(),
                    attack: 7,
                    defend: 2,
                },
                Part {
                    id: "chassis-2".into(),
                    slot: "chassis".into(),
                    attack: 6,
                    defend: 3,
                },
                Part {
                    id: "arm-1".into(),
                    slot: "arm".into(),
                    attack: 5,
                    defend: 2,
                },
                Part {
                    id: "arm-2".into(),
                    slot: "arm".into(),
                    attack: 4,
                    defend: 3,
                },
            ],
        )
    }

    #[test]
    fn test_career_points_formula() {
        let profile = sample_store().profile("alice").unwrap();
        assert_eq!(career_points(&profile), 3 * 12 + 1 * 5 + 2 * 1);
    }

    #[test]
    fn test_authenticate_checks_password() {
        let store = sample_store();
        assert!(store.authenticate("alice", "secret").is_ok());
        assert!(matches!(
            store.authenticate("alice", "wrong"),
            Err(ServerError::AuthenticationFailure)
        ));
        assert!(matches!(
            store.authenticate("nobody", "secret"),
            Err(ServerError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_increments_accumulate() {
        let store = sample_store();
        store.increment_win("bob").unwrap();
        store.increment_win("bob").unwrap();
        store.increment_draw("bob").unwrap();
        store.award_scrap("bob", 25).unwrap();

        let profile = store.profile("bob").unwrap();
        assert_eq!(profile.wins, 2);
        assert_eq!(profile.draws, 1);
        assert_eq!(profile.losses, 0);
        assert_eq!(profile.scrap, 25);
    }

    #[test]
    fn test_attack_defend_sums_over_parts() {
        let store = sample_store();
        let loadout = vec!["chassis-1".to_string(), "arm-1".to_string()];
        assert_eq!(store.get_attack_defend(&loadout).unwrap(), (12, 4));

        let unknown = vec!["chassis-1".to_string(), "leg-9".to_string()];
        assert!(store.get_attack_defend(&unknown).is_err());
    }

    #[test]
    fn test_slots_count_distinct_part_types() {
        let store = sample_store();
        assert_eq!(store.part_slots(), 2);
        assert_eq!(store.part_count(), 4);
    }

    #[test]
    fn test_store_loads_from_json() {
        let raw = r#"{
            "users": [{"user": "carol", "password": "pw", "parts": ["c", "a"]}],
            "parts": [
                {"id": "c", "slot": "chassis", "attack": 6, "defend": 3},
                {"id": "a", "slot": "arm", "attack": 4, "defend": 3}
            ]
        }"#;
        let store = MemoryStore::from_json(raw).unwrap();
        let profile = store.authenticate("carol", "pw").unwrap();
        assert_eq!(career_points(&profile), 0);
        assert_eq!(store.part_slots(), 2);

        assert!(MemoryStore::from_json("not json").is_err());
    }
}
