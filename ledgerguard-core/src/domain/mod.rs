//! Core domain entities
//!
//! The policy condition model lives here: catalogs, conditions, policies,
//! the builder reducer, the formatter, the payload codec and save-time
//! validation. These are pure data structures and functions - no I/O.

pub mod builder;
pub mod catalog;
pub mod codec;
mod condition;
pub mod format;
mod policy;
mod record;
pub mod result;
pub mod validate;

pub use builder::{reduce, PolicyAction, PolicyBuilder, ValueEditor};
pub use catalog::{Catalogs, FieldDescriptor, OperatorDescriptor, ValueType};
pub use codec::{parse_policy_payload, parse_policy_str, to_policy_json, to_policy_string};
pub use condition::{Condition, ConditionPatch, ConditionValue};
pub use format::{format_condition, format_policy, EMPTY_POLICY_TEXT};
pub use policy::{LogicalOperator, Policy};
pub use record::{PolicyRecord, RecordKind};
pub use validate::{validate_policy, PolicyIssue};
