//! Priority-ordered, token-budgeted prompt assembly.
//!
//! The prompt is a set of labeled components rather than a concatenated
//! string: each carries a priority, a required flag, and a token estimate,
//! and the assembler decides what survives under budget pressure.

use sylph_core::{ChatMessage, ChatRole};
use tracing::{debug, warn};

/// Fixed text emitted when no usable memories ground the conversation
pub const ANTI_HALLUCINATION_TEXT: &str = "You have no stored memories of prior conversations \
with this user. Do not invent shared history, past conversations, or facts about them you were \
not given. If asked about the past, say honestly that you don't recall.";

/// Labeled component kinds, ordered here roughly by conventional priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    CoreSystem,
    AttachmentPolicy,
    UserFacts,
    MemoryNarrative,
    ConversationSummary,
    RecentHistory,
    RelationshipContext,
    ConfidenceContext,
    CharacterIdentity,
    CharacterVoice,
    CharacterEmotionalState,
    AiIdentityDisclosure,
    AntiHallucination,
    StyleGuidance,
}

impl ComponentKind {
    /// Section header used in the rendered system message
    pub fn header(self) -> &'static str {
        match self {
            ComponentKind::CoreSystem => "INSTRUCTIONS:",
            ComponentKind::AttachmentPolicy => "ATTACHMENTS:",
            ComponentKind::UserFacts => "USER CONTEXT:",
            ComponentKind::MemoryNarrative => "RELEVANT MEMORIES:",
            ComponentKind::ConversationSummary => "CONVERSATION SUMMARY:",
            ComponentKind::RecentHistory => "RECENT EXCHANGES:",
            ComponentKind::RelationshipContext => "RELATIONSHIP:",
            ComponentKind::ConfidenceContext => "CONTEXT CONFIDENCE:",
            ComponentKind::CharacterIdentity => "IDENTITY:",
            ComponentKind::CharacterVoice => "VOICE:",
            ComponentKind::CharacterEmotionalState => "CURRENT EMOTIONAL STATE:",
            ComponentKind::AiIdentityDisclosure => "DISCLOSURE:",
            ComponentKind::AntiHallucination => "MEMORY POLICY:",
            ComponentKind::StyleGuidance => "STYLE:",
        }
    }
}

/// One labeled prompt component
#[derive(Debug, Clone)]
pub struct PromptComponent {
    pub kind: ComponentKind,
    /// Lower is more important
    pub priority: i32,
    /// Required components survive any budget pressure untruncated
    pub required: bool,
    pub content: String,
    pub token_estimate: usize,
    /// When present and false the component is dropped before sorting
    pub condition: Option<bool>,
}

impl PromptComponent {
    pub fn new(kind: ComponentKind, priority: i32, content: impl Into<String>) -> Self {
        let content = content.into();
        let token_estimate = estimate_tokens(&content);
        Self {
            kind,
            priority,
            required: false,
            content,
            token_estimate,
            condition: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn when(mut self, condition: bool) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Rough token count; close enough for budgeting
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// The rendered outcome of one assembly pass
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    /// Message list ready for the model: system, history, current user turn
    pub messages: Vec<ChatMessage>,
    /// Kinds that made it into the system message, in emission order
    pub included: Vec<ComponentKind>,
    /// Estimated component tokens after budgeting
    pub total_tokens: usize,
}

impl AssembledPrompt {
    pub fn system_text(&self) -> &str {
        self.messages
            .first()
            .filter(|message| message.role == ChatRole::System)
            .map(|message| message.content.as_str())
            .unwrap_or("")
    }
}

/// Most recent history messages appended after the system message
const HISTORY_LIMIT: usize = 15;

/// Token-budgeted assembler
pub struct PromptAssembler {
    token_budget: usize,
    dedup_prefix_chars: usize,
}

impl PromptAssembler {
    pub fn new(token_budget: usize, dedup_prefix_chars: usize) -> Self {
        Self {
            token_budget,
            dedup_prefix_chars,
        }
    }

    /// Assemble components into the final message list.
    ///
    /// Deterministic: the same component list yields the same output, and
    /// components with equal priorities keep their insertion order.
    pub fn assemble(
        &self,
        components: Vec<PromptComponent>,
        history: &[ChatMessage],
        user_message: &str,
    ) -> AssembledPrompt {
        // Failed conditions and empty content never reach sorting
        let mut components: Vec<PromptComponent> = components
            .into_iter()
            .filter(|component| component.condition.unwrap_or(true))
            .filter(|component| !component.content.trim().is_empty())
            .collect();

        components.sort_by_key(|component| component.priority);

        // Content-hash dedup: the first occurrence wins
        let mut seen_keys: Vec<String> = Vec::new();
        components.retain(|component| {
            let key: String = component
                .content
                .trim()
                .chars()
                .take(self.dedup_prefix_chars)
                .collect();
            if seen_keys.contains(&key) {
                false
            } else {
                seen_keys.push(key);
                true
            }
        });

        let total: usize = components.iter().map(|c| c.token_estimate).sum();
        let components = if total > self.token_budget {
            self.fit_to_budget(components)
        } else {
            components
        };

        let included: Vec<ComponentKind> = components.iter().map(|c| c.kind).collect();
        let total_tokens: usize = components.iter().map(|c| c.token_estimate).sum();

        let mut system = String::new();
        for component in &components {
            if !system.is_empty() {
                system.push_str("\n\n");
            }
            system.push_str(component.kind.header());
            system.push('\n');
            system.push_str(component.content.trim());
        }

        let mut messages = Vec::with_capacity(history.len().min(HISTORY_LIMIT) + 2);
        messages.push(ChatMessage::system(system));
        let skip = history.len().saturating_sub(HISTORY_LIMIT);
        messages.extend(history.iter().skip(skip).cloned());
        messages.push(ChatMessage::user(user_message));

        debug!(
            "Assembled prompt with {} components, ~{} tokens",
            included.len(),
            total_tokens
        );

        AssembledPrompt {
            messages,
            included,
            total_tokens,
        }
    }

    /// Budget overflow: keep required components, fill by priority, then
    /// truncate the narrative sections. Required components are never
    /// truncated.
    fn fit_to_budget(&self, components: Vec<PromptComponent>) -> Vec<PromptComponent> {
        let mut kept: Vec<PromptComponent> = Vec::with_capacity(components.len());
        let mut spent: usize = components
            .iter()
            .filter(|c| c.required)
            .map(|c| c.token_estimate)
            .sum();

        let truncatable =
            |kind: ComponentKind| matches!(kind, ComponentKind::MemoryNarrative | ComponentKind::RecentHistory);

        for component in components {
            if component.required {
                kept.push(component);
            } else if spent + component.token_estimate <= self.token_budget {
                spent += component.token_estimate;
                kept.push(component);
            } else if truncatable(component.kind) {
                // Narrative sections are kept over budget and shrunk below
                spent += component.token_estimate;
                kept.push(component);
            } else {
                debug!(
                    "Dropping {:?} (priority {}) under budget pressure",
                    component.kind, component.priority
                );
            }
        }

        let mut total: usize = kept.iter().map(|c| c.token_estimate).sum();
        if total <= self.token_budget {
            return kept;
        }

        // Shrink the narrative sections in the stated order; required
        // components are never truncated
        for target in [ComponentKind::MemoryNarrative, ComponentKind::RecentHistory] {
            if total <= self.token_budget {
                break;
            }
            for component in kept.iter_mut() {
                if component.kind != target || component.required {
                    continue;
                }
                let overflow = total - self.token_budget;
                let keep_tokens = component.token_estimate.saturating_sub(overflow);
                let keep_chars = keep_tokens * 4;
                component.content = component.content.chars().take(keep_chars).collect();
                let new_estimate = estimate_tokens(&component.content);
                total = total - component.token_estimate + new_estimate;
                component.token_estimate = new_estimate;
            }
        }

        if total > self.token_budget {
            warn!(
                "Prompt still ~{} tokens over budget after truncation",
                total - self.token_budget
            );
        }

        kept.retain(|component| !component.content.trim().is_empty());
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(kind: ComponentKind, priority: i32, content: &str) -> PromptComponent {
        PromptComponent::new(kind, priority, content)
    }

    #[test]
    fn test_priority_ordering_with_stable_ties() {
        let assembler = PromptAssembler::new(16_000, 100);
        let prompt = assembler.assemble(
            vec![
                component(ComponentKind::StyleGuidance, 40, "be warm"),
                component(ComponentKind::CharacterIdentity, 10, "you are Elena"),
                component(ComponentKind::UserFacts, 40, "likes diving"),
                component(ComponentKind::CoreSystem, 1, "stay in character"),
            ],
            &[],
            "hi",
        );

        assert_eq!(
            prompt.included,
            vec![
                ComponentKind::CoreSystem,
                ComponentKind::CharacterIdentity,
                ComponentKind::StyleGuidance,
                ComponentKind::UserFacts,
            ]
        );
    }

    #[test]
    fn test_condition_and_empty_filtering() {
        let assembler = PromptAssembler::new(16_000, 100);
        let prompt = assembler.assemble(
            vec![
                component(ComponentKind::CharacterIdentity, 10, "you are Elena"),
                component(ComponentKind::AiIdentityDisclosure, 5, "disclose").when(false),
                component(ComponentKind::UserFacts, 30, "   "),
            ],
            &[],
            "hi",
        );

        assert_eq!(prompt.included, vec![ComponentKind::CharacterIdentity]);
    }

    #[test]
    fn test_dedup_drops_later_duplicates() {
        let assembler = PromptAssembler::new(16_000, 100);
        let prompt = assembler.assemble(
            vec![
                component(ComponentKind::MemoryNarrative, 20, "we went diving"),
                component(ComponentKind::ConversationSummary, 30, "we went diving"),
            ],
            &[],
            "hi",
        );

        assert_eq!(prompt.included, vec![ComponentKind::MemoryNarrative]);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let assembler = PromptAssembler::new(16_000, 100);
        let components = vec![
            component(ComponentKind::CharacterIdentity, 10, "you are Elena"),
            component(ComponentKind::MemoryNarrative, 20, "we went diving"),
            component(ComponentKind::UserFacts, 30, "likes diving"),
        ];

        let first = assembler.assemble(components.clone(), &[], "hi");
        let second = assembler.assemble(components, &[], "hi");
        assert_eq!(first.system_text(), second.system_text());
        assert_eq!(first.included, second.included);
    }

    #[test]
    fn test_under_budget_keeps_every_component() {
        let assembler = PromptAssembler::new(16_000, 100);
        let prompt = assembler.assemble(
            vec![
                component(ComponentKind::CharacterIdentity, 10, "you are Elena"),
                component(ComponentKind::UserFacts, 30, "likes diving"),
                component(ComponentKind::MemoryNarrative, 20, "we went diving"),
            ],
            &[],
            "hi",
        );
        assert_eq!(prompt.included.len(), 3);
    }

    #[test]
    fn test_over_budget_keeps_required_and_priority_order() {
        // Budget of ~50 tokens forces drops
        let assembler = PromptAssembler::new(50, 100);
        let big = "x".repeat(160); // ~40 tokens
        let prompt = assembler.assemble(
            vec![
                PromptComponent::new(ComponentKind::CharacterIdentity, 10, "you are Elena")
                    .required(),
                component(ComponentKind::MemoryNarrative, 20, &big),
                component(ComponentKind::UserFacts, 30, &big),
            ],
            &[],
            "hi",
        );

        assert!(prompt.included.contains(&ComponentKind::CharacterIdentity));
        assert!(prompt.total_tokens <= 50);
        // Ordering never inverts relative to priority
        let identity_pos = prompt
            .included
            .iter()
            .position(|k| *k == ComponentKind::CharacterIdentity)
            .unwrap();
        for (i, kind) in prompt.included.iter().enumerate() {
            if *kind == ComponentKind::MemoryNarrative {
                assert!(identity_pos < i);
            }
        }
    }

    #[test]
    fn test_narrative_truncated_before_history() {
        let assembler = PromptAssembler::new(60, 100);
        let narrative = "m".repeat(200); // ~50 tokens
        let history = "h".repeat(100); // ~25 tokens
        let prompt = assembler.assemble(
            vec![
                PromptComponent::new(ComponentKind::CharacterIdentity, 10, "you are Elena")
                    .required(),
                PromptComponent::new(ComponentKind::MemoryNarrative, 20, &narrative).required(),
                PromptComponent::new(ComponentKind::RecentHistory, 30, &history),
            ],
            &[],
            "hi",
        );

        // Required components are present even when the budget is tight
        assert!(prompt.included.contains(&ComponentKind::CharacterIdentity));
        assert!(prompt.included.contains(&ComponentKind::MemoryNarrative));
        let narrative_len = prompt
            .system_text()
            .lines()
            .filter(|line| line.starts_with('m'))
            .map(str::len)
            .sum::<usize>();
        assert_eq!(narrative_len, 200);
    }

    #[test]
    fn test_history_capped_at_fifteen_messages() {
        let assembler = PromptAssembler::new(16_000, 100);
        let history: Vec<ChatMessage> = (0..20)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("user {}", i))
                } else {
                    ChatMessage::assistant(format!("bot {}", i))
                }
            })
            .collect();

        let prompt = assembler.assemble(
            vec![component(ComponentKind::CharacterIdentity, 10, "Elena")],
            &history,
            "latest",
        );

        // system + 15 history + current user message
        assert_eq!(prompt.messages.len(), 17);
        assert_eq!(prompt.messages[1].content, "user 6");
        assert_eq!(prompt.messages.last().unwrap().content, "latest");
    }
}
