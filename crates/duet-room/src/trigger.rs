//! Trigger evaluation: which world-state syncs a player should perform.
//!
//! Rooms carry *conditions* loaded from JSON files. When something happens
//! in a room (a player becomes valid, reports a previous map, reports a
//! switch or variable) the [`TriggerEvaluator`] turns the room's conditions
//! into [`SyncCommand`]s, which the room layer sends to the client or turns
//! into tag unlocks.
//!
//! ```text
//! trigger ("", "prevMap", …) ──→ ss / sv request ──→ client reports ss / sv
//!                                                        │
//!                                  on_switch / on_variable
//!                                                        ▼
//!                                   next ss / sv request, or TagUnlock
//! ```

use std::path::Path;

use duet_protocol::Rank;
use serde::Deserialize;

/// Game variant whose time-trial conditions are live.
pub const TIME_TRIAL_GAME: &str = "2kki";

/// Switch the client sets to start a time trial.
pub const TIME_TRIAL_SWITCH: i32 = 1430;

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// One unlock condition, as stored in a condition file.
///
/// The id is the file name without `.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Condition {
    pub condition_id: String,
    pub map: u32,
    #[serde(rename = "mapX1")]
    pub map_x1: i32,
    #[serde(rename = "mapY1")]
    pub map_y1: i32,
    #[serde(rename = "mapX2")]
    pub map_x2: i32,
    #[serde(rename = "mapY2")]
    pub map_y2: i32,
    pub switch_id: i32,
    pub switch_value: bool,
    pub switch_ids: Vec<i32>,
    pub switch_values: Vec<bool>,
    pub switch_delay: bool,
    pub var_id: i32,
    pub var_value: i32,
    pub var_ids: Vec<i32>,
    pub var_values: Vec<i32>,
    pub var_op: String,
    pub var_delay: bool,
    pub trigger: String,
    pub value: String,
    pub time_trial: bool,
    pub disabled: bool,
}

impl Condition {
    fn has_switch(&self) -> bool {
        self.switch_id > 0 || !self.switch_ids.is_empty()
    }

    fn has_var(&self) -> bool {
        self.var_id > 0 || !self.var_ids.is_empty()
    }

    /// The first switch the condition needs.
    fn first_switch(&self) -> i32 {
        self.switch_ids.first().copied().unwrap_or(self.switch_id)
    }

    fn first_var(&self) -> i32 {
        self.var_ids.first().copied().unwrap_or(self.var_id)
    }

    fn switch_mode(&self) -> i32 {
        if self.switch_delay { 1 } else { 2 }
    }

    fn var_mode(&self) -> i32 {
        if self.var_delay { 1 } else { 2 }
    }

    /// Whether `(x, y)` lies in the condition's area. A zero range on an
    /// axis means the whole axis.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let in_x = (self.map_x1 == 0 && self.map_x2 == 0) || (self.map_x1 <= x && x <= self.map_x2);
        let in_y = (self.map_y1 == 0 && self.map_y2 == 0) || (self.map_y1 <= y && y <= self.map_y2);
        in_x && in_y
    }
}

/// Loads every `*.json` condition in `dir`.
///
/// Files that cannot be read or parsed are skipped with a warning. A missing
/// directory yields no conditions.
pub fn load_conditions(dir: &Path) -> std::io::Result<Vec<Condition>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(dir = %dir.display(), "conditions directory not found");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut conditions = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "skipping directory entry");
                continue;
            }
        };
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable condition");
                continue;
            }
        };
        match serde_json::from_slice::<Condition>(&data) {
            Ok(mut condition) => {
                condition.condition_id = id.to_string();
                if condition.has_var() && condition.var_op.is_empty() {
                    condition.var_op = "=".to_string();
                }
                conditions.push(condition);
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping condition"),
        }
    }

    conditions.sort_by(|a, b| a.condition_id.cmp(&b.condition_id));
    Ok(conditions)
}

// ---------------------------------------------------------------------------
// Evaluator contract
// ---------------------------------------------------------------------------

/// What the evaluator needs to know about the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerContext {
    pub account: bool,
    pub rank: Rank,
    pub x: i32,
    pub y: i32,
}

/// A follow-up the room layer carries out for the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCommand {
    /// Ask the client for a switch: `ss|id|mode`.
    SwitchSync { id: i32, mode: i32 },
    /// Ask the client for a variable: `sv|id|mode`.
    VarSync { id: i32, mode: i32 },
    /// Unlock the condition's tag.
    TagUnlock { condition_id: String },
    /// Ask the client to report an event: `sev|id|kind`.
    EventSync { event_id: i32, kind: i32 },
}

/// Turns room conditions into sync commands.
pub trait TriggerEvaluator: Send + Sync + 'static {
    /// A trigger fired. The empty trigger means the player just became
    /// valid in the room.
    fn on_trigger(
        &self,
        conditions: &[Condition],
        player: &PlayerContext,
        trigger: &str,
        value: &str,
    ) -> Vec<SyncCommand>;

    /// The client reported a switch value.
    fn on_switch(
        &self,
        conditions: &[Condition],
        player: &PlayerContext,
        id: i32,
        value: bool,
    ) -> Vec<SyncCommand>;

    /// The client reported a variable value.
    fn on_variable(
        &self,
        conditions: &[Condition],
        player: &PlayerContext,
        id: i32,
        value: i32,
    ) -> Vec<SyncCommand>;
}

// ---------------------------------------------------------------------------
// ConditionEvaluator
// ---------------------------------------------------------------------------

/// Reference evaluator for badge conditions.
#[derive(Debug, Clone)]
pub struct ConditionEvaluator {
    game_name: String,
}

/// How far a reported switch or variable moves a condition.
enum Step {
    /// The next requirement in the chain.
    Next(i32),
    /// Every requirement is met.
    Done,
}

impl ConditionEvaluator {
    pub fn new(game_name: impl Into<String>) -> Self {
        Self {
            game_name: game_name.into(),
        }
    }

    fn time_trial(&self, condition: &Condition) -> bool {
        condition.time_trial && self.game_name == TIME_TRIAL_GAME
    }

    /// Conditions the player can act on.
    fn active<'a>(
        &self,
        conditions: &'a [Condition],
        player: &PlayerContext,
    ) -> impl Iterator<Item = &'a Condition> {
        let account = player.account;
        let admin = player.rank.is_admin();
        conditions
            .iter()
            .filter(move |c| account && (!c.disabled || admin))
    }

    fn complete(&self, condition: &Condition, player: &PlayerContext) -> Option<SyncCommand> {
        if !condition.contains(player.x, player.y) {
            return None;
        }
        if self.time_trial(condition) {
            Some(SyncCommand::SwitchSync {
                id: TIME_TRIAL_SWITCH,
                mode: 0,
            })
        } else {
            Some(SyncCommand::TagUnlock {
                condition_id: condition.condition_id.clone(),
            })
        }
    }
}

impl TriggerEvaluator for ConditionEvaluator {
    fn on_trigger(
        &self,
        conditions: &[Condition],
        player: &PlayerContext,
        trigger: &str,
        value: &str,
    ) -> Vec<SyncCommand> {
        let mut commands = Vec::new();

        for c in self.active(conditions, player) {
            let time_trial = self.time_trial(c);
            if time_trial || (c.trigger == trigger && (trigger.is_empty() || c.value == value)) {
                if c.has_switch() {
                    commands.push(SyncCommand::SwitchSync {
                        id: c.first_switch(),
                        mode: c.switch_mode(),
                    });
                } else if c.has_var() {
                    commands.push(SyncCommand::VarSync {
                        id: c.first_var(),
                        mode: c.var_mode(),
                    });
                } else if let Some(command) = self.complete(c, player) {
                    commands.push(command);
                }
            } else if trigger.is_empty() && (c.trigger == "event" || c.trigger == "eventAction") {
                let Ok(event_id) = c.value.parse() else {
                    tracing::warn!(
                        target: "duet::error",
                        condition = %c.condition_id,
                        value = %c.value,
                        "event condition value is not a number"
                    );
                    continue;
                };
                let kind = i32::from(c.trigger == "eventAction");
                commands.push(SyncCommand::EventSync { event_id, kind });
            }
        }

        commands
    }

    fn on_switch(
        &self,
        conditions: &[Condition],
        player: &PlayerContext,
        id: i32,
        value: bool,
    ) -> Vec<SyncCommand> {
        let mut commands = Vec::new();

        for c in self.active(conditions, player) {
            let step = if c.switch_ids.is_empty() {
                (c.switch_id > 0 && c.switch_id == id && c.switch_value == value).then_some(Step::Done)
            } else {
                c.switch_ids.iter().position(|&s| s == id).and_then(|i| {
                    let expected = c.switch_values.get(i).copied().unwrap_or(true);
                    (expected == value).then(|| match c.switch_ids.get(i + 1) {
                        Some(&next) => Step::Next(next),
                        None => Step::Done,
                    })
                })
            };

            match step {
                Some(Step::Next(next)) => commands.push(SyncCommand::SwitchSync {
                    id: next,
                    mode: c.switch_mode(),
                }),
                Some(Step::Done) => commands.extend(self.complete(c, player)),
                None => {}
            }
        }

        commands
    }

    fn on_variable(
        &self,
        conditions: &[Condition],
        player: &PlayerContext,
        id: i32,
        value: i32,
    ) -> Vec<SyncCommand> {
        let mut commands = Vec::new();

        for c in self.active(conditions, player) {
            let step = if c.var_ids.is_empty() {
                (c.var_id > 0 && c.var_id == id && compare(&c.var_op, value, c.var_value))
                    .then_some(Step::Done)
            } else {
                c.var_ids.iter().position(|&v| v == id).and_then(|i| {
                    let expected = c.var_values.get(i).copied().unwrap_or(0);
                    compare(&c.var_op, value, expected).then(|| match c.var_ids.get(i + 1) {
                        Some(&next) => Step::Next(next),
                        None => Step::Done,
                    })
                })
            };

            match step {
                Some(Step::Next(next)) => commands.push(SyncCommand::VarSync {
                    id: next,
                    mode: c.var_mode(),
                }),
                Some(Step::Done) => commands.extend(self.complete(c, player)),
                None => {}
            }
        }

        commands
    }
}

/// Applies a condition's variable operator. Unknown operators never match.
fn compare(op: &str, actual: i32, expected: i32) -> bool {
    match op {
        "" | "=" | "==" => actual == expected,
        "!=" => actual != expected,
        ">" => actual > expected,
        ">=" => actual >= expected,
        "<" => actual < expected,
        "<=" => actual <= expected,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> PlayerContext {
        PlayerContext {
            account: true,
            rank: Rank::PLAYER,
            x: 5,
            y: 5,
        }
    }

    fn condition(id: &str) -> Condition {
        Condition {
            condition_id: id.to_string(),
            ..Condition::default()
        }
    }

    fn tag(id: &str) -> SyncCommand {
        SyncCommand::TagUnlock {
            condition_id: id.to_string(),
        }
    }

    // =====================================================================
    // on_trigger()
    // =====================================================================

    #[test]
    fn test_on_trigger_plain_condition_unlocks_tag() {
        let eval = ConditionEvaluator::new("yume");
        let cmds = eval.on_trigger(&[condition("c1")], &player(), "", "");
        assert_eq!(cmds, [tag("c1")]);
    }

    #[test]
    fn test_on_trigger_non_account_gets_nothing() {
        let eval = ConditionEvaluator::new("yume");
        let guest = PlayerContext {
            account: false,
            ..player()
        };
        assert!(eval.on_trigger(&[condition("c1")], &guest, "", "").is_empty());
    }

    #[test]
    fn test_on_trigger_disabled_only_for_admins() {
        let eval = ConditionEvaluator::new("yume");
        let mut c = condition("c1");
        c.disabled = true;

        assert!(eval.on_trigger(&[c.clone()], &player(), "", "").is_empty());

        let admin = PlayerContext {
            rank: Rank::ADMIN,
            ..player()
        };
        assert_eq!(eval.on_trigger(&[c], &admin, "", ""), [tag("c1")]);
    }

    #[test]
    fn test_on_trigger_matches_trigger_and_value() {
        let eval = ConditionEvaluator::new("yume");
        let mut c = condition("prev");
        c.trigger = "prevMap".into();
        c.value = "0012".into();
        let conditions = [c];

        assert!(eval.on_trigger(&conditions, &player(), "", "").is_empty());
        assert!(eval.on_trigger(&conditions, &player(), "prevMap", "0013").is_empty());
        assert_eq!(
            eval.on_trigger(&conditions, &player(), "prevMap", "0012"),
            [tag("prev")]
        );
    }

    #[test]
    fn test_on_trigger_switch_and_var_requests() {
        let eval = ConditionEvaluator::new("yume");
        let mut sw = condition("sw");
        sw.switch_ids = vec![40, 41];
        sw.switch_delay = true;
        let mut var = condition("var");
        var.var_id = 9;

        let cmds = eval.on_trigger(&[sw, var], &player(), "", "");
        assert_eq!(
            cmds,
            [
                SyncCommand::SwitchSync { id: 40, mode: 1 },
                SyncCommand::VarSync { id: 9, mode: 2 },
            ]
        );
    }

    #[test]
    fn test_on_trigger_coords_outside_area_skips() {
        let eval = ConditionEvaluator::new("yume");
        let mut c = condition("area");
        c.map_x1 = 10;
        c.map_x2 = 20;
        assert!(eval.on_trigger(&[c], &player(), "", "").is_empty());
    }

    #[test]
    fn test_on_trigger_time_trial_only_in_2kki() {
        let mut c = condition("tt");
        c.time_trial = true;
        c.trigger = "other".into();
        let conditions = [c];

        let cmds = ConditionEvaluator::new("2kki").on_trigger(&conditions, &player(), "", "");
        assert_eq!(
            cmds,
            [SyncCommand::SwitchSync {
                id: TIME_TRIAL_SWITCH,
                mode: 0
            }]
        );
        assert!(ConditionEvaluator::new("yume")
            .on_trigger(&conditions, &player(), "", "")
            .is_empty());
    }

    #[test]
    fn test_on_trigger_event_conditions_on_empty_trigger() {
        let eval = ConditionEvaluator::new("yume");
        let mut event = condition("ev");
        event.trigger = "event".into();
        event.value = "12".into();
        let mut action = condition("act");
        action.trigger = "eventAction".into();
        action.value = "13".into();
        let mut broken = condition("bad");
        broken.trigger = "event".into();
        broken.value = "x".into();

        let cmds = eval.on_trigger(&[event, action, broken], &player(), "", "");
        assert_eq!(
            cmds,
            [
                SyncCommand::EventSync { event_id: 12, kind: 0 },
                SyncCommand::EventSync { event_id: 13, kind: 1 },
            ]
        );
    }

    // =====================================================================
    // on_switch() / on_variable()
    // =====================================================================

    #[test]
    fn test_on_switch_chain_requests_next_then_unlocks() {
        let eval = ConditionEvaluator::new("yume");
        let mut c = condition("chain");
        c.switch_ids = vec![40, 41];
        c.switch_values = vec![true, false];
        let conditions = [c];

        assert_eq!(
            eval.on_switch(&conditions, &player(), 40, true),
            [SyncCommand::SwitchSync { id: 41, mode: 2 }]
        );
        assert!(eval.on_switch(&conditions, &player(), 41, true).is_empty());
        assert_eq!(eval.on_switch(&conditions, &player(), 41, false), [tag("chain")]);
    }

    #[test]
    fn test_on_switch_single_requires_value() {
        let eval = ConditionEvaluator::new("yume");
        let mut c = condition("one");
        c.switch_id = 7;
        c.switch_value = true;
        let conditions = [c];

        assert!(eval.on_switch(&conditions, &player(), 7, false).is_empty());
        assert!(eval.on_switch(&conditions, &player(), 8, true).is_empty());
        assert_eq!(eval.on_switch(&conditions, &player(), 7, true), [tag("one")]);
    }

    #[test]
    fn test_on_variable_applies_operator() {
        let eval = ConditionEvaluator::new("yume");
        let mut c = condition("score");
        c.var_id = 3;
        c.var_value = 100;
        c.var_op = ">=".into();
        let conditions = [c];

        assert!(eval.on_variable(&conditions, &player(), 3, 99).is_empty());
        assert_eq!(eval.on_variable(&conditions, &player(), 3, 100), [tag("score")]);
    }

    #[test]
    fn test_compare_operators() {
        assert!(compare("=", 1, 1));
        assert!(compare("!=", 1, 2));
        assert!(compare("<", 1, 2));
        assert!(compare("<=", 2, 2));
        assert!(compare(">", 3, 2));
        assert!(!compare("~", 1, 1));
    }

    // =====================================================================
    // load_conditions()
    // =====================================================================

    #[test]
    fn test_load_conditions_reads_json_files() {
        let dir = std::env::temp_dir().join(format!("duet-conditions-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("forest.json"), r#"{"map": 12, "varId": 4, "varValue": 2}"#).unwrap();
        std::fs::write(dir.join("broken.json"), "{").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let conditions = load_conditions(&dir).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(conditions.len(), 1);
        let c = &conditions[0];
        assert_eq!(c.condition_id, "forest");
        assert_eq!(c.map, 12);
        assert_eq!(c.var_id, 4);
        assert_eq!(c.var_op, "=");
    }

    #[test]
    fn test_load_conditions_skips_unreadable_file() {
        let dir = std::env::temp_dir().join(format!("duet-unreadable-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("folder.json")).unwrap();
        std::fs::write(dir.join("lake.json"), r#"{"map": 3}"#).unwrap();

        let conditions = load_conditions(&dir).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        let ids: Vec<_> = conditions.iter().map(|c| c.condition_id.as_str()).collect();
        assert_eq!(ids, vec!["lake"]);
    }

    #[test]
    fn test_load_conditions_missing_dir_is_empty() {
        let conditions = load_conditions(Path::new("/nonexistent/duet/conditions")).unwrap();
        assert!(conditions.is_empty());
    }
}
