use std::sync::OnceLock;

use regex::Regex;

/// Expand `{{ env.VAR }}` placeholders in a raw TOML string
///
/// Expansion runs before deserialization so config structs hold plain
/// strings. Lines starting with `#` are passed through untouched. A
/// referenced variable that is unset is an error.
pub fn expand_env(input: &str) -> Result<String, String> {
    fn re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"\{\{\s*env\.([A-Za-z0-9_]+)\s*\}\}").expect("must be valid regex"))
    }

    let mut output = String::with_capacity(input.len());

    for (i, line) in input.lines().enumerate() {
        if i > 0 {
            output.push('\n');
        }

        if line.trim_start().starts_with('#') {
            output.push_str(line);
            continue;
        }

        let mut last_end = 0;
        for captures in re().captures_iter(line) {
            let overall = captures.get(0).expect("overall match");
            let var_name = captures.get(1).expect("capture group").as_str();

            output.push_str(&line[last_end..overall.start()]);
            match std::env::var(var_name) {
                Ok(value) => output.push_str(&value),
                Err(_) => return Err(format!("environment variable not found: `{var_name}`")),
            }
            last_end = overall.end();
        }
        output.push_str(&line[last_end..]);
    }

    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_placeholders() {
        let input = "key = \"value\"";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn expands_set_variable() {
        temp_env::with_var("NAVARCH_TEST_VAR", Some("abc"), || {
            let result = expand_env("token = \"{{ env.NAVARCH_TEST_VAR }}\"").unwrap();
            assert_eq!(result, "token = \"abc\"");
        });
    }

    #[test]
    fn missing_variable_errors() {
        temp_env::with_var_unset("NAVARCH_MISSING", || {
            let err = expand_env("token = \"{{ env.NAVARCH_MISSING }}\"").unwrap_err();
            assert!(err.contains("NAVARCH_MISSING"));
        });
    }

    #[test]
    fn comment_lines_are_not_expanded() {
        temp_env::with_var_unset("NAVARCH_MISSING", || {
            let input = "# token = \"{{ env.NAVARCH_MISSING }}\"";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }
}
