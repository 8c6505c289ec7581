//! Pure text helpers used when committing results into a live field.
//!
//! Lengths and offsets are counted in `char`s, matching how the
//! [`TextBuffer`](crate::buffer::TextBuffer) port measures its ranges.

use crate::config::SpeechPreset;

/// CJK sentence marks stripped in addition to ASCII punctuation
const CJK_TRAILING_MARKS: [char; 7] = ['，', '。', '！', '？', '；', '、', '：'];

fn is_trailing_punct(c: char) -> bool {
    c.is_ascii_punctuation() || CJK_TRAILING_MARKS.contains(&c)
}

/// Strip the whole run of punctuation at the end of `text`.
pub fn trim_trailing_punctuation(text: &str) -> &str {
    text.trim_end_matches(is_trailing_punct)
}

/// Apply trailing-punctuation trimming when enabled
pub fn maybe_trim(text: &str, enabled: bool) -> String {
    if enabled {
        trim_trailing_punctuation(text).to_string()
    } else {
        text.to_string()
    }
}

/// Buffer edits needed to turn an in-flight preview into the final text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    /// Characters to delete before the cursor first
    pub delete_before: usize,
    /// Text to commit afterwards; may be empty
    pub commit: String,
}

/// Plan how a final transcript lands on top of what a partial already put
/// in the field.
///
/// When the final text extends the partial only the new suffix is
/// committed. Otherwise the partial is deleted and the final text committed
/// whole. Without a partial, the first `committed_stable_len` characters
/// were already written and are skipped.
pub fn plan_final_merge(
    partial: Option<&str>,
    committed_stable_len: usize,
    final_text: &str,
) -> MergePlan {
    match partial.filter(|p| !p.is_empty()) {
        Some(partial) => match final_text.strip_prefix(partial) {
            Some(rest) => MergePlan {
                delete_before: 0,
                commit: rest.to_string(),
            },
            None => MergePlan {
                delete_before: partial.chars().count(),
                commit: final_text.to_string(),
            },
        },
        None => MergePlan {
            delete_before: 0,
            commit: final_text.chars().skip(committed_stable_len).collect(),
        },
    }
}

/// Where previously committed text was found around the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetLocation {
    /// The text immediately before the cursor ends with the target
    BeforeCursor,
    /// The text immediately after the cursor starts with the target
    AfterCursor,
    /// Last occurrence in `before + after`; `end` is the char offset just
    /// past it, relative to the start of `before`
    Within { end: usize },
}

/// Find `target` next to the cursor, trying the end of `before`, then the
/// start of `after`, then the last occurrence in both joined together.
pub fn locate_target(
    before: Option<&str>,
    after: Option<&str>,
    target: &str,
) -> Option<TargetLocation> {
    if target.is_empty() {
        return None;
    }
    if before.is_some_and(|b| b.ends_with(target)) {
        return Some(TargetLocation::BeforeCursor);
    }
    if after.is_some_and(|a| a.starts_with(target)) {
        return Some(TargetLocation::AfterCursor);
    }

    let combined = format!("{}{}", before?, after?);
    let pos = combined.rfind(target)?;
    let end = combined[..pos].chars().count() + target.chars().count();
    Some(TargetLocation::Within { end })
}

/// Literal replacement for a spoken preset name, if one matches exactly
pub fn find_speech_preset<'a>(presets: &'a [SpeechPreset], text: &str) -> Option<&'a str> {
    let spoken = text.trim();
    if spoken.is_empty() {
        return None;
    }
    presets
        .iter()
        .find(|p| p.name.trim() == spoken)
        .map(|p| p.content.as_str())
}

/// First `max_chars` characters, with an ellipsis when truncated
pub fn snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_trailing_punctuation() {
        assert_eq!(trim_trailing_punctuation("你好，"), "你好");
        assert_eq!(trim_trailing_punctuation("帮我写一封邮件。"), "帮我写一封邮件");
        assert_eq!(trim_trailing_punctuation("Hello, world!?"), "Hello, world");
        assert_eq!(trim_trailing_punctuation("no punct"), "no punct");
        assert_eq!(trim_trailing_punctuation("。！"), "");
        assert_eq!(trim_trailing_punctuation(""), "");
    }

    #[test]
    fn test_trim_is_idempotent() {
        for input in ["你好，。", "a.b.", "...", "x", "问：", "end ;"] {
            let once = trim_trailing_punctuation(input);
            assert_eq!(trim_trailing_punctuation(once), once, "input {input:?}");
        }
    }

    #[test]
    fn test_trim_keeps_inner_punctuation() {
        assert_eq!(trim_trailing_punctuation("a, b, c."), "a, b, c");
    }

    #[test]
    fn test_merge_extends_partial() {
        let plan = plan_final_merge(Some("hello"), 0, "hello world");
        assert_eq!(plan.delete_before, 0);
        assert_eq!(plan.commit, " world");
    }

    #[test]
    fn test_merge_rewrites_changed_partial() {
        let plan = plan_final_merge(Some("你好世界"), 0, "你好，世界。");
        assert_eq!(plan.delete_before, 4);
        assert_eq!(plan.commit, "你好，世界。");
    }

    #[test]
    fn test_merge_skips_stable_prefix() {
        let plan = plan_final_merge(None, 2, "你好世界");
        assert_eq!(plan.delete_before, 0);
        assert_eq!(plan.commit, "世界");

        let plan = plan_final_merge(Some(""), 10, "short");
        assert_eq!(plan.commit, "");
    }

    #[test]
    fn test_merge_identical_partial_commits_nothing() {
        let plan = plan_final_merge(Some("done"), 0, "done");
        assert_eq!(plan, MergePlan { delete_before: 0, commit: String::new() });
    }

    #[test]
    fn test_locate_prefers_before_cursor() {
        let loc = locate_target(Some("今天明天开会"), Some("明天开会"), "明天开会");
        assert_eq!(loc, Some(TargetLocation::BeforeCursor));
    }

    #[test]
    fn test_locate_after_cursor() {
        let loc = locate_target(Some("abc "), Some("target rest"), "target");
        assert_eq!(loc, Some(TargetLocation::AfterCursor));
    }

    #[test]
    fn test_locate_last_occurrence() {
        let loc = locate_target(Some("一x二"), Some("三x四"), "x");
        assert_eq!(loc, Some(TargetLocation::Within { end: 5 }));

        let loc = locate_target(Some("the target is"), Some(" here"), "target");
        assert_eq!(loc, Some(TargetLocation::Within { end: 10 }));
    }

    #[test]
    fn test_locate_missing_or_unreadable() {
        assert_eq!(locate_target(Some("abc"), Some("def"), "zzz"), None);
        assert_eq!(locate_target(None, Some("def"), "abc"), None);
        assert_eq!(locate_target(Some("abc"), Some("def"), ""), None);
    }

    #[test]
    fn test_find_speech_preset() {
        let presets = vec![SpeechPreset {
            name: "my address".into(),
            content: "1 Main St".into(),
        }];
        assert_eq!(find_speech_preset(&presets, " my address "), Some("1 Main St"));
        assert_eq!(find_speech_preset(&presets, "my address please"), None);
        assert_eq!(find_speech_preset(&presets, "  "), None);
    }

    #[test]
    fn test_snippet() {
        assert_eq!(snippet("short", 10), "short");
        assert_eq!(snippet("一二三四五六七八九十十一", 10), "一二三四五六七八九十…");
    }
}
