//! Special rules engine.
//!
//! Some ships carry rulebook exceptions that modify armament or sensors
//! depending on the state of a battle. Rules are declared once per unit (from
//! the ship catalog) and re-evaluated against a [`BattleContext`] whenever the
//! battle moves on. Evaluation is idempotent: the same context always yields
//! the same unit fields.

use crate::catalog::ShipSpec;
use crate::types::UnitId;
use crate::unit::NavalUnit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// The fixed set of special rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialRuleType {
    /// Main battery may fail; resolved by the combat resolver.
    UnreliableMainArmament,
    /// Stern turrets bear only during the initial phase.
    SternGunsInitialPhaseOnly,
    /// Main battery cannot fire at extreme range.
    NoMainGunsAtExtremeRange,
    /// Fire-control radar is knocked out by the ship's own salvoes after round 1.
    RadarLossAfterFirstRound,
}

/// Phase of a surface engagement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BattlePhase {
    #[default]
    Initial,
    Main,
    Pursuit,
}

/// Gunnery range band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RangeBand {
    Short,
    Medium,
    #[default]
    Long,
    Extreme,
}

/// Battle state the rules are evaluated against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BattleContext {
    pub phase: BattlePhase,
    pub range: RangeBand,
    /// Combat round, starting at 1.
    pub round: u32,
}

impl Default for BattleContext {
    fn default() -> Self {
        Self {
            phase: BattlePhase::Initial,
            range: RangeBand::Long,
            round: 1,
        }
    }
}

impl BattleContext {
    pub fn new(phase: BattlePhase, range: RangeBand, round: u32) -> Self {
        Self { phase, range, round }
    }
}

impl SpecialRuleType {
    /// Is the rule's effect in force for `ctx`?
    pub fn triggers(&self, ctx: &BattleContext) -> bool {
        match self {
            SpecialRuleType::UnreliableMainArmament => true,
            SpecialRuleType::SternGunsInitialPhaseOnly => ctx.phase != BattlePhase::Initial,
            SpecialRuleType::NoMainGunsAtExtremeRange => ctx.range == RangeBand::Extreme,
            SpecialRuleType::RadarLossAfterFirstRound => ctx.round > 1,
        }
    }
}

/// When and how often a rule has fired, for combat logs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerHistory {
    pub triggered: bool,
    pub first_triggered_at: Option<DateTime<Utc>>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub trigger_count: u32,
    pub last_context: Option<BattleContext>,
}

impl TriggerHistory {
    fn stamp(&mut self, ctx: &BattleContext) {
        let now = Utc::now();
        self.triggered = true;
        self.first_triggered_at.get_or_insert(now);
        self.last_triggered_at = Some(now);
        self.trigger_count += 1;
        self.last_context = Some(*ctx);
    }
}

/// One declared rule on one unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpecialRule {
    pub rule_type: SpecialRuleType,
    pub active: bool,
    pub history: TriggerHistory,
}

/// Outcome of evaluating one rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleApplication {
    pub unit_id: UnitId,
    pub rule_type: SpecialRuleType,
    pub triggered: bool,
}

/// Registry of special rules per unit.
///
/// An owned value: construct one per process (or per game) and hand it to
/// whatever resolves combat.
#[derive(Clone, Debug, Default)]
pub struct SpecialRulesEngine {
    rules: HashMap<UnitId, Vec<SpecialRule>>,
}

impl SpecialRulesEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a rule for a unit. Declaring the same rule twice is a no-op.
    pub fn register(&mut self, unit_id: UnitId, rule_type: SpecialRuleType) {
        let rules = self.rules.entry(unit_id).or_default();
        if rules.iter().any(|r| r.rule_type == rule_type) {
            return;
        }
        rules.push(SpecialRule {
            rule_type,
            active: true,
            history: TriggerHistory::default(),
        });
    }

    /// Declare every rule the catalog lists for the unit's ship.
    pub fn register_from_catalog(&mut self, unit_id: UnitId, spec: &ShipSpec) {
        for rule_type in &spec.special_rules {
            self.register(unit_id, *rule_type);
        }
        if !spec.special_rules.is_empty() {
            debug!(unit_id, ship = %spec.name, rules = spec.special_rules.len(), "registered special rules");
        }
    }

    /// Drop every rule of a unit (e.g. once it is sunk).
    pub fn unregister(&mut self, unit_id: UnitId) {
        self.rules.remove(&unit_id);
    }

    /// Enable or disable a declared rule. Returns `false` if it was never declared.
    pub fn set_active(&mut self, unit_id: UnitId, rule_type: SpecialRuleType, active: bool) -> bool {
        match self
            .rules
            .get_mut(&unit_id)
            .and_then(|rules| rules.iter_mut().find(|r| r.rule_type == rule_type))
        {
            Some(rule) => {
                rule.active = active;
                true
            }
            None => false,
        }
    }

    pub fn rules_for(&self, unit_id: UnitId) -> &[SpecialRule] {
        self.rules.get(&unit_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_active(&self, unit_id: UnitId, rule_type: SpecialRuleType) -> bool {
        self.rules_for(unit_id)
            .iter()
            .any(|r| r.active && r.rule_type == rule_type)
    }

    /// Trigger history of every declared rule of a unit.
    pub fn history(&self, unit_id: UnitId) -> Vec<(SpecialRuleType, &TriggerHistory)> {
        self.rules_for(unit_id)
            .iter()
            .map(|r| (r.rule_type, &r.history))
            .collect()
    }

    /// Evaluate the unit's active rules against `ctx` and update its fields.
    ///
    /// Armament governed by a rule is zeroed while the rule triggers and
    /// restored to its baseline otherwise. Radar loss is one-way.
    pub fn apply_to_unit(&mut self, unit: &mut NavalUnit, ctx: &BattleContext) -> Vec<RuleApplication> {
        let Some(rules) = self.rules.get_mut(&unit.id) else {
            return Vec::new();
        };

        let mut applications = Vec::new();
        let mut governs_bow = false;
        let mut governs_stern = false;
        let mut silence_bow = false;
        let mut silence_stern = false;

        for rule in rules.iter_mut().filter(|r| r.active) {
            let triggered = rule.rule_type.triggers(ctx);
            match rule.rule_type {
                SpecialRuleType::UnreliableMainArmament => {}
                SpecialRuleType::SternGunsInitialPhaseOnly => {
                    governs_stern = true;
                    silence_stern |= triggered;
                }
                SpecialRuleType::NoMainGunsAtExtremeRange => {
                    governs_bow = true;
                    governs_stern = true;
                    silence_bow |= triggered;
                    silence_stern |= triggered;
                }
                SpecialRuleType::RadarLossAfterFirstRound => {
                    if triggered {
                        unit.radar = 0;
                    }
                }
            }

            if triggered {
                rule.history.stamp(ctx);
            }
            applications.push(RuleApplication {
                unit_id: unit.id,
                rule_type: rule.rule_type,
                triggered,
            });
        }

        // Fields are settled after all rules are read so overlapping rules compose
        if governs_bow {
            unit.primary_bow = if silence_bow { 0 } else { unit.base_primary_bow };
        }
        if governs_stern {
            unit.primary_stern = if silence_stern { 0 } else { unit.base_primary_stern };
        }

        applications
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ShipCatalog;

    fn unit_with_rules(name: &str, engine: &mut SpecialRulesEngine) -> NavalUnit {
        let catalog = ShipCatalog::builtin();
        let spec = catalog.get(name).unwrap();
        let unit = NavalUnit::from_spec(9, "g".to_string(), spec, "K15".parse().unwrap());
        engine.register_from_catalog(unit.id, spec);
        unit
    }

    #[test]
    fn test_stern_guns_follow_phase() {
        let mut engine = SpecialRulesEngine::new();
        let mut rodney = unit_with_rules("Rodney", &mut engine);
        assert_eq!(rodney.base_primary_stern, 4);

        engine.apply_to_unit(&mut rodney, &BattleContext::new(BattlePhase::Main, RangeBand::Long, 1));
        assert_eq!(rodney.primary_stern, 0);
        assert_eq!(rodney.primary_bow, rodney.base_primary_bow);

        engine.apply_to_unit(&mut rodney, &BattleContext::new(BattlePhase::Initial, RangeBand::Long, 1));
        assert_eq!(rodney.primary_stern, 4);
    }

    #[test]
    fn test_extreme_range_silences_main_battery() {
        let mut engine = SpecialRulesEngine::new();
        let mut hood = unit_with_rules("Hood", &mut engine);

        let apps = engine.apply_to_unit(&mut hood, &BattleContext::new(BattlePhase::Initial, RangeBand::Extreme, 1));
        assert_eq!(hood.primary_bow, 0);
        assert_eq!(hood.primary_stern, 0);
        assert!(apps[0].triggered);

        engine.apply_to_unit(&mut hood, &BattleContext::new(BattlePhase::Initial, RangeBand::Long, 2));
        assert_eq!(hood.primary_bow, hood.base_primary_bow);
        assert_eq!(hood.primary_stern, hood.base_primary_stern);
    }

    #[test]
    fn test_radar_loss_is_one_way() {
        let mut engine = SpecialRulesEngine::new();
        let mut bismarck = unit_with_rules("Bismarck", &mut engine);
        assert!(bismarck.radar > 0);

        engine.apply_to_unit(&mut bismarck, &BattleContext::new(BattlePhase::Initial, RangeBand::Long, 1));
        assert_eq!(bismarck.radar, bismarck.base_radar);

        engine.apply_to_unit(&mut bismarck, &BattleContext::new(BattlePhase::Main, RangeBand::Long, 2));
        assert_eq!(bismarck.radar, 0);

        engine.apply_to_unit(&mut bismarck, &BattleContext::new(BattlePhase::Initial, RangeBand::Long, 1));
        assert_eq!(bismarck.radar, 0);
    }

    #[test]
    fn test_unreliable_armament_always_triggers_while_active() {
        let mut engine = SpecialRulesEngine::new();
        let mut pow = unit_with_rules("Prince of Wales", &mut engine);
        let before = pow.clone();

        let apps = engine.apply_to_unit(&mut pow, &BattleContext::default());
        assert_eq!(apps.len(), 1);
        assert!(apps[0].triggered);
        assert_eq!(pow, before);
        assert!(engine.has_active(pow.id, SpecialRuleType::UnreliableMainArmament));

        engine.set_active(pow.id, SpecialRuleType::UnreliableMainArmament, false);
        assert!(engine.apply_to_unit(&mut pow, &BattleContext::default()).is_empty());
    }

    #[test]
    fn test_history_stamped_on_trigger() {
        let mut engine = SpecialRulesEngine::new();
        let mut rodney = unit_with_rules("Rodney", &mut engine);
        let main = BattleContext::new(BattlePhase::Main, RangeBand::Medium, 3);

        engine.apply_to_unit(&mut rodney, &BattleContext::default());
        let (_, history) = engine.history(rodney.id)[0];
        assert!(!history.triggered);

        engine.apply_to_unit(&mut rodney, &main);
        engine.apply_to_unit(&mut rodney, &main);
        let (rule_type, history) = engine.history(rodney.id)[0];
        assert_eq!(rule_type, SpecialRuleType::SternGunsInitialPhaseOnly);
        assert!(history.triggered);
        assert_eq!(history.trigger_count, 2);
        assert_eq!(history.last_context, Some(main));
        assert!(history.first_triggered_at <= history.last_triggered_at);
    }

    #[test]
    fn test_register_is_deduplicated() {
        let mut engine = SpecialRulesEngine::new();
        engine.register(1, SpecialRuleType::RadarLossAfterFirstRound);
        engine.register(1, SpecialRuleType::RadarLossAfterFirstRound);
        assert_eq!(engine.rules_for(1).len(), 1);
        assert!(!engine.set_active(2, SpecialRuleType::RadarLossAfterFirstRound, false));
    }
}
