//! Thread building and draining.
//!
//! One `Thread` is one notification batch: changed paths are matched
//! against live effect refs, subscriptions are walked to locate
//! subscriber instances, and the resulting entries drain in
//! numeric-aware lineage order. Matched refs re-assert their conditions
//! and computed-path checks at drain time, since memo values may have
//! moved between scheduling and running.

use serde::Serialize;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::graph::{
    lineage, matching, ConditionId, MemoId, PathStep, Ref, RefId, Reference, ReferenceId, Unit,
    UnitId, UnitKind,
};
use crate::value::Value;

use super::{ExitKind, Instance, Runtime};

/// One drain step: which instance ran, and for which matched refs.
#[derive(Debug, Clone, Serialize)]
pub struct TraceStep {
    pub lineage: String,
    pub refs: Vec<RefId>,
}

/// The "why did it re-run" record of the most recent thread.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThreadTrace {
    pub steps: Vec<TraceStep>,
}

/// A matched `(subscriber ref, changed path)` pair awaiting drain.
struct Scheduled {
    signal_reference: ReferenceId,
    signal_ref: RefId,
    changed: Vec<String>,
}

struct ThreadEntry {
    instance: Rc<Instance>,
    scheduled: Vec<Scheduled>,
    /// Escalated or synthesized entries run regardless of ref checks.
    unconditional: bool,
}

/// One batch scheduling/draining session.
#[derive(Default)]
pub struct Thread {
    entries: Vec<ThreadEntry>,
}

impl Thread {
    /// Match every changed path against the live effect refs and build
    /// the ordered entry set.
    pub fn build(rt: &Runtime, paths: &[Vec<String>]) -> Thread {
        let mut thread = Thread::default();
        for path in paths {
            thread.notify_path(rt, path);
        }
        thread
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn notify_path(&mut self, rt: &Runtime, changed: &[String]) {
        let mut sites: Vec<(UnitId, ReferenceId, RefId)> = Vec::new();
        rt.graph.root.walk(&mut |unit| {
            for reference in unit.effects.values() {
                for r in &reference.refs {
                    sites.push((unit.id, reference.id, r.id));
                }
            }
        });
        for (unit_id, reference_id, ref_id) in sites {
            let Some(unit) = rt.graph.unit(unit_id) else { continue };
            let Some(reference) = unit.effects.get(&reference_id) else { continue };
            let Some(r) = reference.find_ref(ref_id) else { continue };
            for einst in rt.instances_of(unit_id) {
                if ref_matches(&einst, &r.path, changed) {
                    self.schedule_effect_ref(rt, r, changed);
                }
            }
        }
    }

    /// Walk one effect ref's subscription table, scheduling each
    /// subscriber ref that still matches the changed path.
    fn schedule_effect_ref(&mut self, rt: &Runtime, effect_ref: &Ref, changed: &[String]) {
        for (subscriber, ref_ids) in &effect_ref.subscriptions {
            let Some(sub_unit_id) = lineage_tail(&subscriber.lineage) else { continue };
            let Some(sub_unit) = rt.graph.unit(sub_unit_id) else { continue };
            let Some(sig_reference) = sub_unit.signals.get(&subscriber.reference) else {
                continue;
            };
            for sinst in rt.instances_of(sub_unit_id) {
                for ref_id in ref_ids {
                    let Some(sr) = sig_reference.find_ref(*ref_id) else { continue };
                    let mut full = sr.path.clone();
                    full.extend(sr.depth.iter().cloned());
                    if !ref_matches(&sinst, &full, changed) {
                        continue;
                    }
                    if sr.is_iteration_contract_target && changed.len() > sr.path.len() {
                        self.schedule_iteration_target(
                            rt,
                            &sinst,
                            sub_unit,
                            &changed[sr.path.len()],
                        );
                        continue;
                    }
                    self.push(
                        sinst.clone(),
                        Scheduled {
                            signal_reference: sig_reference.id,
                            signal_ref: *ref_id,
                            changed: changed.to_vec(),
                        },
                    );
                }
            }
        }
    }

    /// A contract-target hit re-runs only the keyed iteration instance
    /// named by the path remainder; an unseen key synthesizes the
    /// instance an append would have created.
    fn schedule_iteration_target(
        &mut self,
        rt: &Runtime,
        driver: &Rc<Instance>,
        driver_unit: &Unit,
        key: &str,
    ) {
        let Some(body) = driver_unit
            .sub_units
            .values()
            .find(|u| u.kind == UnitKind::IterationInstance)
        else {
            return;
        };
        if let Some(instance) = driver.keyed_child_instance(body.id, key) {
            self.push_unconditional(instance);
            return;
        }
        // Appended element: no live instance yet. Seed one from the
        // driver's last run frame with the iteration variable bound.
        let Some(run_env) = driver.run_env.borrow().clone() else { return };
        let Some(iter_var) = driver_unit.spec.iter_var.clone() else { return };
        let Some(closure) = rt.closure(body.id) else { return };
        let env = run_env.child();
        env.declare(&iter_var, Value::string(key));
        let instance = driver.adopt(body.id, Some(key.to_string()), env);
        *instance.closure.borrow_mut() = Some(closure);
        self.push_unconditional(instance);
    }

    fn push(&mut self, instance: Rc<Instance>, scheduled: Scheduled) {
        match self.entry_of(&instance) {
            Some(entry) => {
                let duplicate = entry.scheduled.iter().any(|s| {
                    s.signal_reference == scheduled.signal_reference
                        && s.signal_ref == scheduled.signal_ref
                        && s.changed == scheduled.changed
                });
                if !duplicate {
                    entry.scheduled.push(scheduled);
                }
            }
            None => self.entries.push(ThreadEntry {
                instance,
                scheduled: vec![scheduled],
                unconditional: false,
            }),
        }
    }

    fn push_unconditional(&mut self, instance: Rc<Instance>) {
        match self.entry_of(&instance) {
            Some(entry) => entry.unconditional = true,
            None => self.entries.push(ThreadEntry {
                instance,
                scheduled: Vec::new(),
                unconditional: true,
            }),
        }
    }

    fn entry_of(&mut self, instance: &Rc<Instance>) -> Option<&mut ThreadEntry> {
        self.entries
            .iter_mut()
            .find(|entry| Rc::ptr_eq(&entry.instance, instance))
    }

    fn pop_lowest(&mut self) -> Option<ThreadEntry> {
        if self.entries.is_empty() {
            return None;
        }
        let mut lowest = 0;
        for index in 1..self.entries.len() {
            if lineage::compare(
                &self.entries[index].instance.lineage,
                &self.entries[lowest].instance.lineage,
            )
            .is_lt()
            {
                lowest = index;
            }
        }
        Some(self.entries.swap_remove(lowest))
    }

    /// Drain in lineage order. `run` re-invokes one instance's callee;
    /// cascades and exit escalations feed entries back into the
    /// sequence until it empties.
    pub fn drain(
        mut self,
        rt: &Runtime,
        run: &mut dyn FnMut(&Rc<Instance>) -> Result<Value, RuntimeError>,
    ) -> Result<(), RuntimeError> {
        rt.trace.replace(ThreadTrace::default());
        while let Some(entry) = self.pop_lowest() {
            let instance = entry.instance;
            if instance.disposed.get() {
                continue;
            }
            if rt.suppressed_by_exit(&instance) {
                continue;
            }
            let survivors: Vec<&Scheduled> = entry
                .scheduled
                .iter()
                .filter(|s| self.reassert(rt, &instance, s))
                .collect();
            if survivors.is_empty() && !entry.unconditional {
                continue;
            }

            let before = instance.last_exit.borrow().clone();
            run(&instance)?;
            let after = rt.pending_exit.borrow().as_ref().map(|e| e.status());
            *instance.last_exit.borrow_mut() = after.clone();

            rt.trace.borrow_mut().steps.push(TraceStep {
                lineage: instance.lineage.clone(),
                refs: survivors.iter().map(|s| s.signal_ref).collect(),
            });

            // An exit appearing or clearing forces the exit's target to
            // re-run so suppressed sibling statements resume correctly.
            // A pending program-level return instead resolves when the
            // sequence empties.
            if before != after
                && let Some(status) = after.clone().or(before)
                && !(status.kind == ExitKind::Return && status.target == rt.graph.root.id)
                && let Some(target) = instance.ancestor_of_unit(status.target)
                && !Rc::ptr_eq(&target, &instance)
            {
                // The target re-derives the exit from scratch; a stale
                // pending exit would trip its hoisted guards at the
                // first statement of the re-run.
                *rt.pending_exit.borrow_mut() = None;
                self.push_unconditional(target);
            }

            let cascades: Vec<Scheduled> = survivors
                .iter()
                .map(|s| Scheduled {
                    signal_reference: s.signal_reference,
                    signal_ref: s.signal_ref,
                    changed: s.changed.clone(),
                })
                .collect();
            for scheduled in cascades {
                self.cascade(rt, &instance, &scheduled);
            }
        }
        Ok(())
    }

    /// Re-assert a scheduled ref against current memo values: its
    /// condition chain must hold and its resolved path must still be
    /// prefix-compatible with the changed path.
    fn reassert(&self, rt: &Runtime, instance: &Rc<Instance>, scheduled: &Scheduled) -> bool {
        let Some(unit) = rt.graph.unit(instance.unit) else { return false };
        let Some(reference) = unit.signals.get(&scheduled.signal_reference) else {
            return false;
        };
        let Some(r) = reference.find_ref(scheduled.signal_ref) else { return false };
        if !condition_holds(rt, instance, unit.id, r.condition) {
            return false;
        }
        let mut full = r.path.clone();
        full.extend(r.depth.iter().cloned());
        ref_matches(instance, &full, &scheduled.changed)
    }

    /// Follow assignee links out of a consumed ref: effects whose
    /// right-hand side was the matched signal now carry the change
    /// onward under their own written path plus the unconsumed
    /// remainder.
    fn cascade(&mut self, rt: &Runtime, instance: &Rc<Instance>, scheduled: &Scheduled) {
        let Some(unit) = rt.graph.unit(instance.unit) else { return };
        let Some(sig_reference) = unit.signals.get(&scheduled.signal_reference) else {
            return;
        };
        let Some(sr) = sig_reference.find_ref(scheduled.signal_ref) else { return };
        let consumed = sr.path.len() + sr.depth.len();
        let leftover: &[String] = if scheduled.changed.len() > consumed {
            &scheduled.changed[consumed..]
        } else {
            &[]
        };
        let downstream: Vec<&Reference> = unit
            .effects
            .values()
            .filter(|e| e.assignee == Some(scheduled.signal_reference))
            .collect();
        for effect in downstream {
            for er in &effect.refs {
                let Some(mut derived) = concrete_path(instance, &er.path) else { continue };
                derived.extend(leftover.iter().cloned());
                self.schedule_effect_ref(rt, er, &derived);
            }
        }
    }
}

/// Evaluate a ref's condition chain against the memo stores of the
/// owning ancestor instances.
fn condition_holds(
    rt: &Runtime,
    instance: &Rc<Instance>,
    unit: UnitId,
    condition: Option<ConditionId>,
) -> bool {
    let mut current = condition;
    while let Some(id) = current {
        let Some(owner) = rt.graph.condition_owner(unit, id) else { return false };
        let Some(owner_instance) = instance.ancestor_of_unit(owner.id) else { return false };
        let Some(cond) = owner.condition(id) else { return false };
        if !cond.holds(&|memo| owner_instance.memo(memo)) {
            return false;
        }
        current = cond.parent;
    }
    true
}

/// Match a ref path against a concrete changed path, resolving the
/// deferred memo comparisons against the instance's memo store. A memo
/// slot that was never populated fails the match; the instance never
/// ran far enough to observe a key there.
fn ref_matches(instance: &Instance, steps: &[PathStep], changed: &[String]) -> bool {
    let Some(m) = matching::match_path_keys(steps, changed) else {
        return false;
    };
    let populated = m.deferred.iter().all(|check| match &check.left {
        matching::Operand::Memo(id) => instance.memos.borrow().contains_key(id),
        matching::Operand::Lit(_) => true,
    });
    if !populated {
        return false;
    }
    let memo = |id: MemoId| instance.memo(id);
    matching::deferred_hold(&m.deferred, &memo, &memo)
}

/// Resolve a ref path to concrete string keys through an instance's
/// memo store; `None` when a memo slot was never populated. Cascades
/// use this to build the derived changed path they carry onward.
fn concrete_path(instance: &Instance, steps: &[PathStep]) -> Option<Vec<String>> {
    let mut keys = Vec::with_capacity(steps.len());
    for step in steps {
        match step {
            PathStep::Name(name) => keys.push(name.clone()),
            PathStep::Memo { memo } => {
                let value = instance.memos.borrow().get(memo).cloned()?;
                keys.push(value.to_key());
            }
        }
    }
    Some(keys)
}

fn lineage_tail(lineage: &str) -> Option<UnitId> {
    lineage.rsplit('/').next()?.parse().ok()
}
