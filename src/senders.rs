use std::collections::HashMap;

use crate::types::MessageSummary;

/// How sender addresses are compared when grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SenderKey {
    /// Exact string equality; `A@x.com` and `a@x.com` are different senders.
    #[default]
    Exact,
    /// Lowercased addresses.
    FoldCase,
}

impl SenderKey {
    pub fn key(self, email: &str) -> String {
        match self {
            SenderKey::Exact => email.to_string(),
            SenderKey::FoldCase => email.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SenderGroup {
    pub email: String,
    pub name: String,
    pub messages: Vec<MessageSummary>,
}

impl SenderGroup {
    pub fn count(&self) -> usize {
        self.messages.len()
    }
}

/// Group by first sender, largest groups first. Message order within a group
/// and the order of equally sized groups follow the input.
pub fn group_by_sender(messages: Vec<MessageSummary>, key: SenderKey) -> Vec<SenderGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<SenderGroup> = Vec::new();

    for m in messages {
        let (email, name) = match m.sender() {
            Some(a) => {
                let email = key.key(&a.email);
                let name = a
                    .name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map_or_else(|| email.clone(), str::to_string);
                (email, name)
            }
            None => (String::new(), String::new()),
        };

        match index.get(&email) {
            Some(&i) => groups[i].messages.push(m),
            None => {
                index.insert(email.clone(), groups.len());
                groups.push(SenderGroup {
                    email,
                    name,
                    messages: vec![m],
                });
            }
        }
    }

    groups.sort_by(|a, b| b.count().cmp(&a.count()));
    groups
}
