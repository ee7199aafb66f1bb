//! Final graph resolution: subscription wiring and pruning.
//!
//! After the tree walk, every signal ref is matched against the effect
//! refs sharing its base binding (same declaring scope, or both
//! undeclared with the same base name). Undeclared bases first get a
//! synthesized external effect reference on the program root, so
//! changed paths entering `thread()` always find a live effect ref to
//! start from. Signal references that matched nothing, empty
//! references, and unused conditions are pruned from the emitted graph.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::CompileError;
use crate::graph::{
    ConditionId, PathStep, Ref, RefId, RefPath, ReferenceId, SubscriberKey, matching,
};
use crate::scope::ScopeId;

use super::Transformer;

#[derive(Debug)]
struct EffectSite {
    unit: usize,
    reference: ReferenceId,
    ref_index: usize,
    base_scope: Option<ScopeId>,
    base: String,
    path: RefPath,
}

impl Transformer {
    pub(super) fn resolve(&mut self) -> Result<(), CompileError> {
        self.synthesize_external_effects();
        let sites = self.effect_sites();

        // doSubscribe: wire each signal ref to the effect refs over the
        // same binding.
        let mut ops: Vec<(usize, ReferenceId, usize, SubscriberKey, RefId)> = Vec::new();
        let mut kept_signals: FxHashSet<(usize, ReferenceId)> = FxHashSet::default();
        for (unit_index, unit) in self.units.iter().enumerate() {
            for reference in unit.signals.values() {
                for r in &reference.refs {
                    let Some(base) = r.base_name() else { continue };
                    for site in &sites {
                        if site.unit == unit_index {
                            continue;
                        }
                        if site.base_scope != r.base_scope || site.base != base {
                            continue;
                        }
                        if matching::match_refs(&r.path, &site.path).is_none() {
                            continue;
                        }
                        ops.push((
                            site.unit,
                            site.reference,
                            site.ref_index,
                            SubscriberKey {
                                lineage: unit.lineage.clone(),
                                reference: reference.id,
                            },
                            r.id,
                        ));
                        kept_signals.insert((unit_index, reference.id));
                    }
                }
            }
        }
        for (unit, reference, ref_index, key, rid) in ops {
            self.units[unit]
                .effects
                .get_mut(&reference)
                .expect("effect site indexes a live reference")
                .refs[ref_index]
                .subscribe(key, rid);
        }

        self.prune(&kept_signals);
        self.count_conditions();
        Ok(())
    }

    /// One external effect reference per undeclared base name, on the
    /// program root.
    fn synthesize_external_effects(&mut self) {
        let mut externals: Vec<String> = Vec::new();
        for unit in &self.units {
            for reference in unit.signals.values() {
                for r in &reference.refs {
                    if r.base_scope.is_none()
                        && let Some(base) = r.base_name()
                        && !externals.iter().any(|e| e == base)
                    {
                        externals.push(base.to_string());
                    }
                }
            }
        }
        for base in externals {
            let id = self.next_ref_id();
            let effect = self.new_effect(0, None, None);
            let mut path = RefPath::new();
            path.push(PathStep::name(base));
            self.units[0]
                .effects
                .get_mut(&effect)
                .expect("just installed")
                .push_ref(Ref::new(id, path));
        }
    }

    fn effect_sites(&mut self) -> Vec<EffectSite> {
        let mut sites = Vec::new();
        for (unit_index, unit) in self.units.iter().enumerate() {
            for reference in unit.effects.values() {
                for (ref_index, r) in reference.refs.iter().enumerate() {
                    let Some(base) = r.base_name() else { continue };
                    sites.push(EffectSite {
                        unit: unit_index,
                        reference: reference.id,
                        ref_index,
                        base_scope: r.base_scope,
                        base: base.to_string(),
                        path: r.path.clone(),
                    });
                }
            }
        }
        sites
    }

    /// Drop signal references nothing subscribed, empty references, and
    /// dangling assignee links.
    fn prune(&mut self, kept_signals: &FxHashSet<(usize, ReferenceId)>) {
        for unit_index in 0..self.units.len() {
            let dropped: Vec<ReferenceId> = self.units[unit_index]
                .signals
                .iter()
                .filter(|(id, reference)| {
                    reference.is_empty() || !kept_signals.contains(&(unit_index, **id))
                })
                .map(|(id, _)| *id)
                .collect();
            let unit = &mut self.units[unit_index];
            for id in &dropped {
                unit.signals.shift_remove(id);
            }
            unit.effects.retain(|_, reference| !reference.is_empty());
            for reference in unit.effects.values_mut() {
                if let Some(assignee) = reference.assignee
                    && dropped.contains(&assignee)
                {
                    reference.assignee = None;
                }
            }
        }
    }

    /// Reference-count conditions from surviving refs; unused ones are
    /// pruned from the emitted graph.
    fn count_conditions(&mut self) {
        let mut owner: FxHashMap<ConditionId, usize> = FxHashMap::default();
        for (unit_index, unit) in self.units.iter().enumerate() {
            for id in unit.conditions.keys() {
                owner.insert(*id, unit_index);
            }
        }
        let mut used: Vec<ConditionId> = Vec::new();
        for unit in &self.units {
            for reference in unit.signals.values().chain(unit.effects.values()) {
                for r in &reference.refs {
                    if let Some(condition) = r.condition {
                        used.push(condition);
                    }
                }
            }
        }
        for mut current in used {
            loop {
                let Some(&unit_index) = owner.get(&current) else { break };
                let condition = self.units[unit_index]
                    .conditions
                    .get_mut(&current)
                    .expect("owner map is in sync");
                condition.in_use += 1;
                match condition.parent {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
        }
        for unit in &mut self.units {
            unit.conditions.retain(|_, condition| condition.in_use > 0);
        }
    }
}
