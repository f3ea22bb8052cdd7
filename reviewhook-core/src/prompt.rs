/// Instruction block sent ahead of the previous comments and the diff.
pub const REVIEW_INSTRUCTIONS: &str = include_str!("../prompt.txt");

/// Placeholder used when nothing has been posted on the pull request yet.
pub const NO_PREVIOUS_COMMENTS: &str = "No previous comments";

/// Build the review prompt for one diff.
///
/// The output only depends on its inputs. The response parser in
/// [`crate::comments`] relies on the JSON array contract stated here.
pub fn build_prompt(diff: &str, previous_comments: &[String]) -> String {
    let mut prompt = String::from(REVIEW_INSTRUCTIONS);

    if previous_comments.is_empty() {
        prompt.push_str(NO_PREVIOUS_COMMENTS);
    } else {
        prompt.push_str(&previous_comments.join("\n"));
    }

    prompt.push_str("\n\n### Code diff\nDIFF BEGINS:\n");
    prompt.push_str(diff);
    prompt.push_str("\nDIFF ENDS\n");

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIFF: &str = "diff --git a/src/a.rs b/src/a.rs\n@@ -1 +1 @@\n-let x = 1;\n+let x = 2;";

    #[test]
    fn test_prompt_is_deterministic() {
        let previous = vec!["Consider a constant".to_string()];
        assert_eq!(build_prompt(DIFF, &previous), build_prompt(DIFF, &previous));
    }

    #[test]
    fn test_prompt_embeds_diff_verbatim() {
        let prompt = build_prompt(DIFF, &[]);
        assert!(prompt.contains(&format!("DIFF BEGINS:\n{}\nDIFF ENDS", DIFF)));
    }

    #[test]
    fn test_prompt_states_response_contract() {
        let prompt = build_prompt(DIFF, &[]);
        assert!(prompt.contains("JSON array"));
        assert!(prompt.contains("\"comment\""));
        assert!(prompt.contains("\"filePath\""));
        assert!(prompt.contains("\"lineNumber\""));
        assert!(prompt.contains("respond with exactly:\n[]"));
    }

    #[test]
    fn test_empty_history_uses_sentinel() {
        let prompt = build_prompt(DIFF, &[]);
        assert!(prompt.contains("Do not repeat any of them, even in different words.\nNo previous comments\n"));
    }

    #[test]
    fn test_previous_comments_are_newline_joined() {
        let previous = vec!["First remark".to_string(), "Second remark".to_string()];
        let prompt = build_prompt(DIFF, &previous);
        assert!(prompt.contains("First remark\nSecond remark\n\n### Code diff"));
        assert!(!prompt.contains(NO_PREVIOUS_COMMENTS));
    }

    #[test]
    fn test_diff_is_not_interpreted() {
        let diff = "+println!(\"{}\", \"No previous comments\");";
        let prompt = build_prompt(diff, &["{diff}".to_string()]);
        assert!(prompt.contains("{diff}\n\n### Code diff"));
        assert!(prompt.ends_with(&format!("{}\nDIFF ENDS\n", diff)));
    }
}
