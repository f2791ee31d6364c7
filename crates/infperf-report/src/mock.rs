//! Reference `DatasetSource`/`Tokenizer` collaborators, standing in for the
//! real dataset producers and tokenizer libraries that are out of scope
//! here. Cycles a small fixed set of prompts rather than reading a corpus.

use infperf_core::model::{ChatMessage, DatasetItem, RequestSpec};
use infperf_core::traits::{DatasetSource, Tokenizer};

const PROMPTS: &[&str] = &[
    "Tell me about the history of the Roman Empire.",
    "Write a haiku about autumn leaves.",
    "Explain how a binary search tree works.",
    "What are the main causes of climate change?",
    "Summarize the plot of Hamlet in two sentences.",
];

/// Cycles a small fixed prompt set indefinitely, optionally as chat turns.
/// `count()` returns `None` — this dataset never signals exhaustion, since
/// a stage's size is driven by its configured rate/duration instead.
pub struct MockDataset {
    as_chat: bool,
    max_tokens: Option<u32>,
    idx: usize,
}

impl MockDataset {
    pub fn new(as_chat: bool, max_tokens: Option<u32>) -> Self {
        MockDataset { as_chat, max_tokens, idx: 0 }
    }
}

impl DatasetSource for MockDataset {
    fn next_item(&mut self) -> Option<DatasetItem> {
        let prompt = PROMPTS[self.idx % PROMPTS.len()];
        self.idx += 1;
        let spec = if self.as_chat {
            RequestSpec::Chat {
                messages: vec![ChatMessage { role: "user".to_string(), content: prompt.to_string() }],
                max_tokens: self.max_tokens,
            }
        } else {
            RequestSpec::Completion { prompt: prompt.to_string(), max_tokens: self.max_tokens }
        };
        Some(DatasetItem { spec, preferred_worker_id: None })
    }
}

/// Counts tokens as whitespace-separated words. Good enough for the mock
/// dataset and for exercising the orchestrator without a real tokenizer
/// library dependency.
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn count_tokens(&self, text: &str) -> u32 {
        text.split_whitespace().count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_through_prompts() {
        let mut dataset = MockDataset::new(false, None);
        let first = dataset.next_item().unwrap();
        for _ in 0..PROMPTS.len() - 1 {
            dataset.next_item();
        }
        let wrapped = dataset.next_item().unwrap();
        assert_eq!(first.spec.prompt_text(), wrapped.spec.prompt_text());
    }

    #[test]
    fn chat_mode_wraps_prompt_as_user_message() {
        let mut dataset = MockDataset::new(true, Some(32));
        let item = dataset.next_item().unwrap();
        assert!(matches!(item.spec, RequestSpec::Chat { .. }));
        assert_eq!(item.spec.max_tokens(), Some(32));
    }

    #[test]
    fn whitespace_tokenizer_counts_words() {
        assert_eq!(WhitespaceTokenizer.count_tokens("the quick brown fox"), 4);
        assert_eq!(WhitespaceTokenizer.count_tokens(""), 0);
    }
}
