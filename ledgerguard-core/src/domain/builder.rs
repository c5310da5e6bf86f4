//! Policy builder
//!
//! Editing is modelled as a pure reducer, `reduce(policy, action)`, so any
//! front end (the CLI prompt loop, a desktop view) can drive it. The
//! `PolicyBuilder` wrapper keeps a working copy and hands every updated
//! policy to its owner through an optional listener; the owner holds the
//! authoritative value.

use std::fmt;

use super::catalog::{Catalogs, OperatorDescriptor, ValueType};
use super::condition::{Condition, ConditionPatch};
use super::policy::{LogicalOperator, Policy};

/// A single edit to a policy
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyAction {
    SetLogicalOperator(LogicalOperator),
    AddCondition,
    RemoveCondition(usize),
    UpdateCondition { index: usize, patch: ConditionPatch },
}

/// Apply an action to a policy, returning the updated policy
///
/// Out-of-range indexes leave the policy unchanged.
pub fn reduce(mut policy: Policy, action: PolicyAction) -> Policy {
    match action {
        PolicyAction::SetLogicalOperator(op) => {
            policy.logical_operator = op;
        }
        PolicyAction::AddCondition => {
            policy.conditions.push(Condition::empty());
        }
        PolicyAction::RemoveCondition(index) => {
            if index < policy.conditions.len() {
                policy.conditions.remove(index);
            }
        }
        PolicyAction::UpdateCondition { index, patch } => {
            if let Some(condition) = policy.conditions.get_mut(index) {
                condition.apply(patch);
            }
        }
    }
    policy
}

/// Editor widget to use for a condition's value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueEditor {
    Number,
    Text,
    Date,
    EnumSelect(Vec<String>),
}

type Listener = Box<dyn FnMut(&Policy)>;

/// Working-copy editor over a policy
pub struct PolicyBuilder {
    policy: Policy,
    listener: Option<Listener>,
}

impl PolicyBuilder {
    /// Start editing; a missing policy behaves as `{AND, []}`
    pub fn new(initial: Option<Policy>) -> Self {
        Self {
            policy: initial.unwrap_or_default(),
            listener: None,
        }
    }

    /// Register the owner callback invoked after every change
    pub fn with_listener(mut self, listener: impl FnMut(&Policy) + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn into_policy(self) -> Policy {
        self.policy
    }

    /// Apply an action and notify the listener
    pub fn dispatch(&mut self, action: PolicyAction) -> &Policy {
        let current = std::mem::take(&mut self.policy);
        self.policy = reduce(current, action);
        if let Some(listener) = self.listener.as_mut() {
            listener(&self.policy);
        }
        &self.policy
    }

    pub fn set_logical_operator(&mut self, op: LogicalOperator) -> &Policy {
        self.dispatch(PolicyAction::SetLogicalOperator(op))
    }

    pub fn add_condition(&mut self) -> &Policy {
        self.dispatch(PolicyAction::AddCondition)
    }

    pub fn remove_condition(&mut self, index: usize) -> &Policy {
        self.dispatch(PolicyAction::RemoveCondition(index))
    }

    pub fn update_condition(&mut self, index: usize, patch: ConditionPatch) -> &Policy {
        self.dispatch(PolicyAction::UpdateCondition { index, patch })
    }

    /// Operators offered for the condition at `index`
    ///
    /// `None` while no field is chosen (the selector is disabled). An unknown
    /// field yields an empty list so legacy rows render inertly.
    pub fn operator_choices<'c>(
        &self,
        index: usize,
        catalogs: &'c Catalogs,
    ) -> Option<&'c [OperatorDescriptor]> {
        let condition = self.policy.conditions.get(index)?;
        if condition.field.is_empty() {
            return None;
        }
        Some(catalogs.operators_for_field(&condition.field))
    }

    /// Value editor for the condition at `index`, plain text by default
    pub fn value_editor(&self, index: usize, catalogs: &Catalogs) -> ValueEditor {
        self.policy
            .conditions
            .get(index)
            .and_then(|c| catalogs.field(&c.field))
            .map(|field| match field.value_type {
                ValueType::Number => ValueEditor::Number,
                ValueType::Text => ValueEditor::Text,
                ValueType::Date => ValueEditor::Date,
                ValueType::Enum => {
                    ValueEditor::EnumSelect(field.enum_values.clone().unwrap_or_default())
                }
            })
            .unwrap_or(ValueEditor::Text)
    }
}

impl Default for PolicyBuilder {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for PolicyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyBuilder")
            .field("policy", &self.policy)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn sample_policy() -> Policy {
        Policy::new(
            LogicalOperator::And,
            vec![
                Condition::new("grand_total", ">", 100),
                Condition::new("vendor_name", "contains", "Acme"),
            ],
        )
    }

    #[test]
    fn test_missing_initial_policy() {
        let builder = PolicyBuilder::new(None);
        assert_eq!(builder.policy(), &Policy::new(LogicalOperator::And, vec![]));
    }

    #[test]
    fn test_set_logical_operator_keeps_conditions() {
        let policy = reduce(sample_policy(), PolicyAction::SetLogicalOperator(LogicalOperator::Or));
        assert_eq!(policy.logical_operator, LogicalOperator::Or);
        assert_eq!(policy.conditions, sample_policy().conditions);
    }

    #[test]
    fn test_add_then_remove_last_restores_sequence() {
        let before = sample_policy();
        let added = reduce(before.clone(), PolicyAction::AddCondition);
        assert_eq!(added.conditions.len(), 3);
        assert_eq!(added.conditions[2], Condition::empty());

        let last = added.conditions.len() - 1;
        let restored = reduce(added, PolicyAction::RemoveCondition(last));
        assert_eq!(restored, before);
    }

    #[test]
    fn test_remove_out_of_range_is_noop() {
        let policy = reduce(sample_policy(), PolicyAction::RemoveCondition(7));
        assert_eq!(policy, sample_policy());
    }

    #[test]
    fn test_remove_down_to_zero_is_allowed() {
        let mut builder = PolicyBuilder::new(Some(sample_policy()));
        builder.remove_condition(0);
        builder.remove_condition(0);
        assert!(builder.policy().is_empty());
    }

    #[test]
    fn test_update_resets_on_field_change() {
        let policy = reduce(
            sample_policy(),
            PolicyAction::UpdateCondition {
                index: 0,
                patch: ConditionPatch::field("vendor_name").with_operator(">"),
            },
        );
        assert_eq!(policy.conditions[0], Condition::new("vendor_name", "", ""));
        assert_eq!(policy.conditions[1], sample_policy().conditions[1]);
    }

    #[test]
    fn test_update_out_of_range_is_noop() {
        let policy = reduce(
            sample_policy(),
            PolicyAction::UpdateCondition {
                index: 5,
                patch: ConditionPatch::value(1),
            },
        );
        assert_eq!(policy, sample_policy());
    }

    #[test]
    fn test_listener_sees_every_change() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut builder =
            PolicyBuilder::new(None).with_listener(move |p: &Policy| sink.borrow_mut().push(p.clone()));

        builder.add_condition();
        builder.update_condition(0, ConditionPatch::field("missed_emis"));
        builder.set_logical_operator(LogicalOperator::Or);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].conditions[0].field, "missed_emis");
        assert_eq!(seen.last().unwrap(), builder.policy());
    }

    #[test]
    fn test_operator_choices_disabled_until_field_chosen() {
        let catalogs = Catalogs::default();
        let mut builder = PolicyBuilder::new(None);
        builder.add_condition();
        assert!(builder.operator_choices(0, &catalogs).is_none());

        builder.update_condition(0, ConditionPatch::field("vendor_name"));
        let ops = builder.operator_choices(0, &catalogs).unwrap();
        assert_eq!(ops.len(), 3);

        builder.update_condition(0, ConditionPatch::field("retired_field"));
        assert_eq!(builder.operator_choices(0, &catalogs), Some(&[][..]));
    }

    #[test]
    fn test_value_editor_follows_field_type() {
        let catalogs = Catalogs::default();
        let mut builder = PolicyBuilder::new(None);
        builder.add_condition();
        assert_eq!(builder.value_editor(0, &catalogs), ValueEditor::Text);

        builder.update_condition(0, ConditionPatch::field("grand_total"));
        assert_eq!(builder.value_editor(0, &catalogs), ValueEditor::Number);

        builder.update_condition(0, ConditionPatch::field("due_date"));
        assert_eq!(builder.value_editor(0, &catalogs), ValueEditor::Date);

        builder.update_condition(0, ConditionPatch::field("customer_segment"));
        assert_eq!(
            builder.value_editor(0, &catalogs),
            ValueEditor::EnumSelect(vec![
                "retail".to_string(),
                "sme".to_string(),
                "corporate".to_string()
            ])
        );

        assert_eq!(builder.value_editor(9, &catalogs), ValueEditor::Text);
    }
}
