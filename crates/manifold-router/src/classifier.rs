// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heuristic task classification.
//!
//! Derives a task type and complexity tier from message text using
//! zero-cost heuristic rules. No LLM pre-call, no network, no latency.

/// Broad category of work a request asks for, used for model selection and
/// fallback-chain lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskType {
    /// Nothing matched; routed like ordinary conversation.
    #[default]
    General,
    /// Greetings, small talk, single-fact questions.
    Chat,
    /// Writing, debugging, or reviewing code.
    Code,
    /// Multi-step reasoning, comparison, evaluation.
    Analysis,
    /// Condensing text the user supplied.
    Summarize,
    /// Pulling structured data out of unstructured text.
    Extraction,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::General => write!(f, "general"),
            TaskType::Chat => write!(f, "chat"),
            TaskType::Code => write!(f, "code"),
            TaskType::Analysis => write!(f, "analysis"),
            TaskType::Summarize => write!(f, "summarize"),
            TaskType::Extraction => write!(f, "extraction"),
        }
    }
}

/// Complexity tiers mapped to escalation rungs by the cascading strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TaskComplexity {
    /// One-liner lookups, greetings, yes/no.
    Simple,
    /// General conversation, moderate Q&A.
    #[default]
    Moderate,
    /// Multi-step reasoning, code generation, detailed analysis.
    Complex,
    /// Architecture, planning, open-ended design work.
    Strategic,
}

impl std::fmt::Display for TaskComplexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskComplexity::Simple => write!(f, "simple"),
            TaskComplexity::Moderate => write!(f, "moderate"),
            TaskComplexity::Complex => write!(f, "complex"),
            TaskComplexity::Strategic => write!(f, "strategic"),
        }
    }
}

/// Result of classifying one message.
#[derive(Debug, Clone)]
pub struct TaskProfile {
    pub task_type: TaskType,
    pub complexity: TaskComplexity,
    /// Confidence in the complexity tier (0.0-1.0).
    pub confidence: f32,
    /// Human-readable reason for the classification.
    pub reason: &'static str,
}

/// Small-talk patterns (exact match, case-insensitive).
const CHAT_EXACT: &[&str] = &[
    "hi", "hello", "hey", "thanks", "thank you", "bye", "ok", "okay",
    "yes", "no", "sure", "good", "great", "cool", "nice", "yep", "nope",
    "yeah", "nah",
];

/// Small-talk question patterns (contains, case-insensitive).
const CHAT_QUESTIONS: &[&str] = &[
    "what time", "what day", "what date", "how are you", "what's up",
    "who are you", "what's your name",
];

const CODE_INDICATORS: &[&str] = &[
    "write a function", "write code", "write a program", "implement",
    "debug", "refactor", "fix this code", "code review", "unit test",
    "stack trace", "compile", "regex", "script",
];

const ANALYSIS_INDICATORS: &[&str] = &[
    "analyze", "analyse", "compare", "evaluate", "assess", "investigate",
    "trade-off", "tradeoff", "pros and cons", "explain in detail",
    "step by step", "in depth", "comprehensive",
];

const SUMMARIZE_INDICATORS: &[&str] = &[
    "summarize", "summarise", "summary of", "tl;dr", "tldr", "recap",
    "condense", "shorten this", "key points",
];

const EXTRACTION_INDICATORS: &[&str] = &[
    "extract", "parse", "list all", "pull out", "as json", "into json",
    "as csv", "into a table", "structured output", "field by field",
];

/// Open-ended design and planning signals; these push complexity past the
/// ordinary complex tier.
const STRATEGIC_INDICATORS: &[&str] = &[
    "architecture", "system design", "design a system", "roadmap",
    "migration plan", "end-to-end", "from scratch", "strategy",
];

/// Heuristic classifier with zero cost and zero latency.
pub struct TaskClassifier {
    /// Confidence threshold below which uncertain Simple classifications
    /// are upgraded to Moderate.
    confidence_threshold: f32,
}

impl TaskClassifier {
    pub fn new() -> Self {
        Self {
            confidence_threshold: 0.4,
        }
    }

    pub fn with_threshold(confidence_threshold: f32) -> Self {
        Self {
            confidence_threshold,
        }
    }

    /// Classify a message, considering recent conversation context
    /// (last 2-3 messages) to track momentum.
    pub fn classify(&self, message: &str, recent_context: &[&str]) -> TaskProfile {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return TaskProfile {
                task_type: TaskType::Chat,
                complexity: TaskComplexity::Simple,
                confidence: 1.0,
                reason: "empty message",
            };
        }

        let lower = trimmed.to_lowercase();
        let task_type = Self::detect_task_type(trimmed, &lower);

        let mut score: i32 = 0;

        // Signal 1: message length
        let word_count = trimmed.split_whitespace().count();
        score += Self::length_score(word_count);

        // Signal 2: small-talk exact match
        if CHAT_EXACT.iter().any(|p| lower == *p) {
            score -= 3;
        }

        // Signal 3: small-talk question patterns
        if CHAT_QUESTIONS.iter().any(|q| lower.contains(q)) {
            score -= 2;
        }

        // Signal 4: heavyweight task indicators
        if ANALYSIS_INDICATORS.iter().any(|c| lower.contains(c))
            || CODE_INDICATORS.iter().any(|c| lower.contains(c))
        {
            score += 2;
        }

        // Signal 5: strategic design signals
        if STRATEGIC_INDICATORS.iter().any(|s| lower.contains(s)) {
            score += 3;
        }

        // Signal 6: code blocks
        if trimmed.contains("```") {
            score += 3;
        }

        // Signal 7: multi-sentence detection
        if Self::count_sentences(trimmed) >= 3 {
            score += 1;
        }

        // Signal 8: conversation momentum
        score += Self::momentum_score(recent_context);

        let (complexity, confidence, reason) = Self::score_to_complexity(score);

        // Uncertain Simple classifications default up one tier rather than
        // risking an underpowered model on a real question.
        if confidence < self.confidence_threshold && complexity == TaskComplexity::Simple {
            return TaskProfile {
                task_type,
                complexity: TaskComplexity::Moderate,
                confidence,
                reason: "low confidence, defaulting up",
            };
        }

        TaskProfile {
            task_type,
            complexity,
            confidence,
            reason,
        }
    }

    fn detect_task_type(text: &str, lower: &str) -> TaskType {
        if text.contains("```") {
            return TaskType::Code;
        }

        let hits = |patterns: &[&str]| patterns.iter().filter(|p| lower.contains(*p)).count();

        // Listed most-specific first; ties keep the earlier entry.
        let ranked = [
            (TaskType::Code, hits(CODE_INDICATORS)),
            (TaskType::Extraction, hits(EXTRACTION_INDICATORS)),
            (TaskType::Summarize, hits(SUMMARIZE_INDICATORS)),
            (TaskType::Analysis, hits(ANALYSIS_INDICATORS)),
        ];
        let mut best = (TaskType::General, 0);
        for (task_type, n) in ranked {
            if n > best.1 {
                best = (task_type, n);
            }
        }
        if best.1 > 0 {
            return best.0;
        }

        if CHAT_EXACT.iter().any(|p| lower == *p)
            || CHAT_QUESTIONS.iter().any(|q| lower.contains(q))
        {
            return TaskType::Chat;
        }

        TaskType::General
    }

    fn length_score(word_count: usize) -> i32 {
        match word_count {
            0..=3 => -2,
            4..=15 => 0,
            16..=50 => 1,
            _ => 2,
        }
    }

    fn count_sentences(text: &str) -> usize {
        let count = text
            .chars()
            .filter(|c| matches!(c, '.' | '?' | '!'))
            .count();
        // At least 1 sentence if there's text.
        count.max(1)
    }

    fn momentum_score(recent_context: &[&str]) -> i32 {
        let limit = recent_context.len().min(3);
        let recent = &recent_context[recent_context.len().saturating_sub(limit)..];

        let heavy_count = recent
            .iter()
            .filter(|m| {
                let lower = m.to_lowercase();
                ANALYSIS_INDICATORS.iter().any(|c| lower.contains(c))
                    || CODE_INDICATORS.iter().any(|c| lower.contains(c))
                    || m.contains("```")
            })
            .count();

        if heavy_count >= 2 { 1 } else { 0 }
    }

    fn score_to_complexity(score: i32) -> (TaskComplexity, f32, &'static str) {
        if score <= -2 {
            let confidence = ((-score) as f32 / 5.0).min(1.0);
            (TaskComplexity::Simple, confidence, "simple query indicators")
        } else if score >= 5 {
            let confidence = (score as f32 / 8.0).min(1.0);
            (
                TaskComplexity::Strategic,
                confidence,
                "strategic design indicators",
            )
        } else if score >= 2 {
            let confidence = (score as f32 / 5.0).min(1.0);
            (
                TaskComplexity::Complex,
                confidence,
                "complex query indicators",
            )
        } else {
            let confidence = 1.0 - (score.unsigned_abs() as f32 / 3.0);
            (TaskComplexity::Moderate, confidence, "moderate complexity")
        }
    }
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self::new()
    }
}
