//! `<exec>` blocks: run each in document order and splice its output back.

use crate::{
    log,
    markup::{Markup, scanner::scan},
    resolve::CodeExecutor,
};

/// Execute every supported block of `text`. Returns the new text and the
/// number of blocks that ran without error.
///
/// Blocks are replaced by offset, so two blocks with identical code each get
/// their own output.
pub fn execute_blocks(text: &str, executor: &mut dyn CodeExecutor) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut executed = 0;

    for reference in scan(text) {
        let Markup::Exec { lang, code, .. } = &reference.markup else {
            continue;
        };
        if !executor.supports(lang) {
            log!("exec"; "unsupported language `{lang}`, block left as is");
            continue;
        }

        let result = executor.execute(code);
        let output = match result.error {
            None => {
                executed += 1;
                result.output
            }
            Some(error) => {
                let summary = error.lines().last().unwrap_or_default();
                log!("exec"; "block failed: {summary}");
                format!("Error: {error}")
            }
        };

        out.push_str(&text[last..reference.span.start]);
        if output == reference.current_value() {
            out.push_str(&reference.raw);
        } else {
            out.push_str(&reference.render(&output));
        }
        last = reference.span.end;
    }

    out.push_str(&text[last..]);
    (out, executed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::fakes::CountingExecutor;

    const BLOCK: &str = "<exec lang=\"python\">\nprint(1)\n</exec>\n<output>\nstale\n</output>";

    #[test]
    fn test_output_spliced() {
        let mut executor = CountingExecutor::default();
        let (text, n) = execute_blocks(&format!("# Doc\n\n{BLOCK}\n\ntail"), &mut executor);
        assert_eq!(n, 1);
        assert_eq!(
            text,
            "# Doc\n\n<exec lang=\"python\">\nprint(1)\n</exec>\n<output>\nrun 1\n</output>\n\ntail"
        );
    }

    #[test]
    fn test_identical_blocks_run_in_order() {
        let mut executor = CountingExecutor::default();
        let (text, n) = execute_blocks(&format!("{BLOCK}\n\n{BLOCK}"), &mut executor);
        assert_eq!(n, 2);
        let first = text.find("run 1").unwrap();
        let second = text.find("run 2").unwrap();
        assert!(first < second);
        assert_eq!(executor.seen, vec!["print(1)", "print(1)"]);
    }

    #[test]
    fn test_error_written_into_output() {
        let mut executor = CountingExecutor {
            fail_on: Some("print(1)".into()),
            ..CountingExecutor::default()
        };
        let (text, n) = execute_blocks(BLOCK, &mut executor);
        assert_eq!(n, 0);
        assert!(text.contains("<output>\nError: NameError: boom\n</output>"));
    }

    #[test]
    fn test_unsupported_language_untouched() {
        let block = "<exec lang=\"ruby\">\nputs 1\n</exec>\n<output>\nold\n</output>";
        let mut executor = CountingExecutor::default();
        let (text, n) = execute_blocks(block, &mut executor);
        assert_eq!((text.as_str(), n), (block, 0));
        assert!(executor.seen.is_empty());
    }

    #[test]
    fn test_same_output_keeps_original_layout() {
        let block = "<exec lang=\"python\">\nprint(1)\n</exec>\n\n<output>\nrun 1\n</output>";
        let mut executor = CountingExecutor::default();
        let (text, n) = execute_blocks(block, &mut executor);
        assert_eq!((text.as_str(), n), (block, 1));
    }

    #[test]
    fn test_rerun_is_stable() {
        let mut executor = CountingExecutor::default();
        let (once, _) = execute_blocks(BLOCK, &mut executor);
        let mut executor = CountingExecutor::default();
        let (twice, _) = execute_blocks(&once, &mut executor);
        assert_eq!(once, twice);
    }
}
