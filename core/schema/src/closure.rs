// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Transitive closure of message types reachable from a set of roots.

use std::collections::BTreeMap;

use crate::descriptor::MessageSchema;
use crate::errors::{Result, SchemaError};
use crate::resolver::resolve_message;
use crate::types::{DeclaredType, MessageType};

/// Set of resolved messages keyed by name.
///
/// Every message appears exactly once. Iteration follows name order, which
/// keeps everything derived from a closure deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageClosure {
    messages: BTreeMap<String, MessageSchema>,
}

impl MessageClosure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closure of all messages reachable from `roots`, roots included.
    pub fn collect(roots: &[MessageType]) -> Result<Self> {
        let mut closure = Self::new();
        for root in roots {
            closure.insert_reachable(*root)?;
        }
        Ok(closure)
    }

    /// Walk `root` and every message it references, directly or not.
    ///
    /// Names already present are not walked again, so self-referential and
    /// mutually recursive types terminate.
    pub fn insert_reachable(&mut self, root: MessageType) -> Result<()> {
        let mut pending = vec![root];

        while let Some(message) = pending.pop() {
            if let Some(existing) = self.messages.get(message.name()) {
                if *existing != resolve_message(message)? {
                    return Err(SchemaError::ConflictingMessage(message.name().to_string()));
                }
                continue;
            }

            let schema = resolve_message(message)?;
            self.messages.insert(schema.name.clone(), schema);

            for field in message.fields() {
                referenced(field.ty(), &mut pending);
            }
        }

        Ok(())
    }

    /// Union with another closure. A name bound to different fields on each
    /// side is an error.
    pub fn merge(&mut self, other: &MessageClosure) -> Result<()> {
        for (name, schema) in &other.messages {
            match self.messages.get(name) {
                Some(existing) if existing != schema => {
                    return Err(SchemaError::ConflictingMessage(name.clone()));
                }
                Some(_) => {}
                None => {
                    self.messages.insert(name.clone(), schema.clone());
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MessageSchema> {
        self.messages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.messages.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageSchema> {
        self.messages.values()
    }
}

fn referenced(ty: &DeclaredType, out: &mut Vec<MessageType>) {
    match ty {
        DeclaredType::Message(message) => out.push(*message),
        DeclaredType::Union(params)
        | DeclaredType::Sequence(params)
        | DeclaredType::Mapping(params)
        | DeclaredType::Stream(params) => {
            for param in params {
                referenced(param, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::types::{Field, Message};

    #[derive(Serialize, Deserialize)]
    struct Leaf {
        value: i64,
    }

    impl Message for Leaf {
        const NAME: &'static str = "Leaf";
        fn fields() -> Vec<Field> {
            vec![Field::of::<i64>("value")]
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Branch {
        left: Option<Leaf>,
        right: Vec<Leaf>,
    }

    impl Message for Branch {
        const NAME: &'static str = "Branch";
        fn fields() -> Vec<Field> {
            vec![Field::of::<Option<Leaf>>("left"), Field::of::<Vec<Leaf>>("right")]
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Root {
        branch: Branch,
        cycle: Option<Box<Root>>,
    }

    fn root_fields() -> Vec<Field> {
        vec![
            Field::of::<Branch>("branch"),
            Field::new("cycle", DeclaredType::optional(DeclaredType::Message(Root::message_type()))),
        ]
    }

    impl Message for Root {
        const NAME: &'static str = "Root";
        fn fields() -> Vec<Field> {
            root_fields()
        }
    }

    #[test]
    fn test_closure_dedup_and_cycles() {
        let closure = MessageClosure::collect(&[Root::message_type(), Branch::message_type()])
            .unwrap();
        let names: Vec<&str> = closure.names().collect();
        assert_eq!(names, vec!["Branch", "Leaf", "Root"]);
    }

    #[test]
    fn test_conflicting_names() {
        fn other_leaf() -> Vec<Field> {
            vec![Field::of::<String>("value")]
        }

        let mut closure = MessageClosure::collect(&[Leaf::message_type()]).unwrap();
        let err = closure
            .insert_reachable(MessageType::new("Leaf", other_leaf))
            .unwrap_err();
        assert!(matches!(err, SchemaError::ConflictingMessage(name) if name == "Leaf"));
    }

    #[test]
    fn test_merge() {
        let mut left = MessageClosure::collect(&[Leaf::message_type()]).unwrap();
        let right = MessageClosure::collect(&[Branch::message_type()]).unwrap();
        left.merge(&right).unwrap();
        assert_eq!(left.len(), 2);
        assert!(left.contains("Branch"));
    }
}
