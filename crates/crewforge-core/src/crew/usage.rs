//! Token accounting across tool loops

use serde::{Deserialize, Serialize};

/// Accumulated usage from one or more tool loops
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatedUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub api_calls: u32,
    pub tool_calls: Vec<String>,
}

impl AccumulatedUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add usage from a single API response
    pub fn add(&mut self, input_tokens: u32, output_tokens: u32) {
        self.input_tokens += input_tokens as u64;
        self.output_tokens += output_tokens as u64;
        self.api_calls += 1;
    }

    /// Record a tool call
    pub fn record_tool_call(&mut self, tool_name: &str) {
        self.tool_calls.push(tool_name.to_string());
    }

    /// Fold another loop's usage into this one
    pub fn merge(&mut self, other: &AccumulatedUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.api_calls += other.api_calls;
        self.tool_calls.extend(other.tool_calls.iter().cloned());
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulated_usage() {
        let mut usage = AccumulatedUsage::new();
        usage.add(100, 50);
        usage.add(200, 75);
        usage.record_tool_call("handbook");

        assert_eq!(usage.input_tokens, 300);
        assert_eq!(usage.output_tokens, 125);
        assert_eq!(usage.api_calls, 2);
        assert_eq!(usage.total_tokens(), 425);
        assert_eq!(usage.tool_calls, vec!["handbook"]);
    }

    #[test]
    fn test_merge() {
        let mut total = AccumulatedUsage::new();
        total.add(10, 5);

        let mut other = AccumulatedUsage::new();
        other.add(1, 1);
        other.record_tool_call("search");

        total.merge(&other);
        assert_eq!(total.api_calls, 2);
        assert_eq!(total.total_tokens(), 17);
        assert_eq!(total.tool_calls, vec!["search"]);
    }
}
