//! Tool/assistant pairing checks and repair.
use super::*;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Counts of pairing defects found (or fixed) in a message list.
pub struct PairingReport {
    pub orphaned_tool_messages: usize,
    pub dangling_tool_calls: usize,
}

impl PairingReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned_tool_messages == 0 && self.dangling_tool_calls == 0
    }
}

/// Reports pairing defects without modifying `messages`.
pub fn pairing_report(messages: &[Message]) -> PairingReport {
    let mut scratch = messages.to_vec();
    repair_tool_pairing(&mut scratch)
}

/// Enforces the pairing invariant in place.
///
/// A tool message survives only if its `tool_call_id` names a call on the
/// nearest preceding assistant message. Calls that never received a result
/// are stripped from their assistant message.
pub fn repair_tool_pairing(messages: &mut Vec<Message>) -> PairingReport {
    let mut report = PairingReport::default();
    let mut open_assistant: Option<usize> = None;
    let mut answered: HashSet<String> = HashSet::new();
    let mut repaired: Vec<Message> = Vec::with_capacity(messages.len());

    for message in messages.drain(..) {
        match message.role {
            MessageRole::Tool => {
                let matched = match (open_assistant, message.tool_call_id.as_deref()) {
                    (Some(index), Some(id)) => repaired[index]
                        .tool_calls
                        .iter()
                        .any(|call| call.id == id),
                    _ => false,
                };
                if matched {
                    if let Some(id) = message.tool_call_id.clone() {
                        answered.insert(id);
                    }
                    repaired.push(message);
                } else {
                    report.orphaned_tool_messages += 1;
                }
            }
            MessageRole::Assistant => {
                if let Some(index) = open_assistant.take() {
                    report.dangling_tool_calls += strip_unanswered(&mut repaired[index], &answered);
                }
                answered.clear();
                repaired.push(message);
                open_assistant = Some(repaired.len() - 1);
            }
            MessageRole::System | MessageRole::User => {
                if let Some(index) = open_assistant.take() {
                    report.dangling_tool_calls += strip_unanswered(&mut repaired[index], &answered);
                }
                answered.clear();
                repaired.push(message);
            }
        }
    }
    if let Some(index) = open_assistant {
        report.dangling_tool_calls += strip_unanswered(&mut repaired[index], &answered);
    }

    *messages = repaired;
    report
}

fn strip_unanswered(message: &mut Message, answered: &HashSet<String>) -> usize {
    let before = message.tool_calls.len();
    message.tool_calls.retain(|call| answered.contains(&call.id));
    before - message.tool_calls.len()
}
