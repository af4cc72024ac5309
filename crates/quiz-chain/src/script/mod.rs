//! Sandboxed script executor.
//!
//! Scripts are written in a small, closed, Python-flavoured language. The
//! source is tokenized, parsed into an AST and interpreted here; nothing in
//! the grammar can name a host capability. The only callables are the
//! builtins in [`builtins`] and the facility handles `io`, `csv`, `json`
//! and `re`.
//!
//! ```text
//! block     := (stmt NEWLINE)* | INDENT block DEDENT
//! stmt      := target ('=' exprs)+ | target augop expr | expr
//!            | 'if' expr ':' block ('elif' expr ':' block)* ['else' ':' block]
//!            | 'for' targets 'in' exprs ':' block
//!            | 'while' expr ':' block
//!            | 'break' | 'continue' | 'pass'
//! expr      := or ['if' or 'else' expr]
//! or        := and ('or' and)*
//! and       := not ('and' not)*
//! not       := 'not' not | compare
//! compare   := arith (cmpop arith)*
//! arith     := term (('+' | '-') term)*
//! term      := unary (('*' | '/' | '//' | '%') unary)*
//! unary     := ('-' | '+') unary | power
//! power     := postfix ['**' unary]
//! postfix   := atom ('(' args ')' | '[' subscript ']' | '.' NAME)*
//! ```

mod ast;
mod builtins;
mod facilities;
mod interp;
mod lexer;
mod parser;
mod value;

use serde::{Deserialize, Serialize};

use value::Value;

/// Resource ceiling for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptLimits {
    /// Statements, loop iterations and comprehension elements.
    pub max_steps: u64,
    /// Longest list or string `range`, repetition and concatenation may build.
    pub max_collection_len: usize,
    /// Longest accepted script source, in bytes.
    pub max_source_len: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            max_collection_len: 1_000_000,
            max_source_len: 64 * 1024,
        }
    }
}

/// Why a script did not produce an answer.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("{0}")]
    Runtime(String),

    #[error("step budget exhausted")]
    StepBudget,
}

impl ScriptError {
    pub(crate) fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Runtime(message.into())
    }
}

pub(crate) type ScriptResult<T> = Result<T, ScriptError>;

/// Outcome of running a script: the `answer` value or a diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionResult {
    Answer(serde_json::Value),
    Failure { diagnostic: String },
}

impl ExecutionResult {
    fn failure(diagnostic: impl Into<String>) -> Self {
        ExecutionResult::Failure {
            diagnostic: diagnostic.into(),
        }
    }

    pub fn answer(&self) -> Option<&serde_json::Value> {
        match self {
            ExecutionResult::Answer(v) => Some(v),
            ExecutionResult::Failure { .. } => None,
        }
    }
}

/// Run `source` and read back the value bound to `answer`.
///
/// Never panics on script input and never reaches the host: every fault,
/// including an exhausted budget, comes back as [`ExecutionResult::Failure`].
pub fn execute(source: &str, limits: &ScriptLimits) -> ExecutionResult {
    if source.len() > limits.max_source_len {
        return ExecutionResult::failure(format!(
            "script is {} bytes, the limit is {}",
            source.len(),
            limits.max_source_len
        ));
    }

    let program = match lexer::tokenize(source).and_then(|tokens| parser::parse(&tokens)) {
        Ok(p) => p,
        Err(e) => return ExecutionResult::failure(e.to_string()),
    };

    let mut interp = interp::Interpreter::new(*limits);
    if let Err(e) = interp.run(&program) {
        let diagnostic = match e {
            ScriptError::StepBudget => format!(
                "line {}: step budget of {} exhausted",
                interp.line(),
                limits.max_steps
            ),
            other => format!("line {}: {other}", interp.line()),
        };
        return ExecutionResult::failure(diagnostic);
    }

    match interp.answer() {
        Value::None => ExecutionResult::failure("script did not assign a value to `answer`"),
        value => match value.to_json() {
            Ok(json) => ExecutionResult::Answer(json),
            Err(e) => ExecutionResult::failure(format!("`answer` cannot be submitted: {e}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(source: &str) -> ExecutionResult {
        execute(source, &ScriptLimits::default())
    }

    fn answer(source: &str) -> serde_json::Value {
        match run(source) {
            ExecutionResult::Answer(v) => v,
            ExecutionResult::Failure { diagnostic } => panic!("script failed: {diagnostic}"),
        }
    }

    fn diagnostic(source: &str) -> String {
        match run(source) {
            ExecutionResult::Answer(v) => panic!("expected failure, got {v}"),
            ExecutionResult::Failure { diagnostic } => diagnostic,
        }
    }

    #[test]
    fn test_simple_arithmetic() {
        assert_eq!(answer("answer = 2 + 2"), json!(4));
    }

    #[test]
    fn test_literal_extraction() {
        assert_eq!(answer("answer = 'the-secret-code'"), json!("the-secret-code"));
    }

    #[test]
    fn test_csv_cutoff_sum() {
        let script = r#"
data = "name,amount\na,20\nb,60000\nc,100000"
cutoff = 42669
total = 0
header = True
for row in csv.reader(io.StringIO(data)):
    if header:
        header = False
        continue
    if int(row[1]) > cutoff:
        total += int(row[1])
answer = total
"#;
        assert_eq!(answer(script), json!(160000));
    }

    #[test]
    fn test_dict_reader_comprehension() {
        let script = r#"
rows = csv.DictReader("name,amount\na,20\nb,60000\nc,100000")
answer = sum(int(r['amount']) for r in rows if int(r['amount']) > 42669)
"#;
        assert_eq!(answer(script), json!(160000));
    }

    #[test]
    fn test_disallowed_capability_is_contained() {
        let diag = diagnostic("answer = open('/etc/passwd').read()");
        assert!(diag.contains("name 'open' is not defined"), "{diag}");
    }

    #[test]
    fn test_import_is_rejected() {
        let diag = diagnostic("import os\nanswer = 1");
        assert!(diag.contains("syntax error on line 1"), "{diag}");
        assert!(diag.contains("import"), "{diag}");
    }

    #[test]
    fn test_dunder_escape_attempt() {
        assert!(matches!(
            run("answer = ''.__class__"),
            ExecutionResult::Failure { .. }
        ));
    }

    #[test]
    fn test_unassigned_answer_fails() {
        let diag = diagnostic("x = 1");
        assert!(diag.contains("answer"), "{diag}");
    }

    #[test]
    fn test_explicit_none_answer_fails() {
        assert!(matches!(run("answer = None"), ExecutionResult::Failure { .. }));
    }

    #[test]
    fn test_runtime_fault_names_line() {
        let diag = diagnostic("x = 1\ny = x / 0\nanswer = y");
        assert!(diag.starts_with("line 2:"), "{diag}");
        assert!(diag.contains("division by zero"), "{diag}");
    }

    #[test]
    fn test_step_budget() {
        let limits = ScriptLimits {
            max_steps: 1_000,
            ..ScriptLimits::default()
        };
        match execute("while True:\n    pass\nanswer = 1", &limits) {
            ExecutionResult::Failure { diagnostic } => {
                assert!(diagnostic.contains("step budget"), "{diagnostic}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_collection_cap() {
        let limits = ScriptLimits {
            max_collection_len: 100,
            ..ScriptLimits::default()
        };
        assert!(matches!(
            execute("answer = len(range(1000))", &limits),
            ExecutionResult::Failure { .. }
        ));
        assert!(matches!(
            execute("answer = len('ab' * 1000)", &limits),
            ExecutionResult::Failure { .. }
        ));
    }

    #[test]
    fn test_source_limit() {
        let limits = ScriptLimits {
            max_source_len: 8,
            ..ScriptLimits::default()
        };
        assert!(matches!(
            execute("answer = 12345", &limits),
            ExecutionResult::Failure { .. }
        ));
    }

    #[test]
    fn test_structured_answer() {
        assert_eq!(
            answer("answer = {'total': 3, 'items': [1, 2.5, 'x', True]}"),
            json!({"total": 3, "items": [1, 2.5, "x", true]})
        );
    }

    #[test]
    fn test_regex_extraction() {
        let script = r#"
text = "The secret code is 48213 and the cutoff is 9"
m = re.search(r"code is (\d+)", text)
answer = int(m.group(1)) if m else 0
"#;
        assert_eq!(answer(script), json!(48213));
    }

    #[test]
    fn test_json_facility() {
        let script = r#"
data = json.loads('[{"v": 3}, {"v": 4}]')
answer = sum([d["v"] for d in data])
"#;
        assert_eq!(answer(script), json!(7));
    }

    #[test]
    fn test_match_answer_is_rejected() {
        let diag = diagnostic("answer = re.search('a', 'a')");
        assert!(diag.contains("cannot be submitted"), "{diag}");
    }

    /// Runs on a thread the size of a tokio blocking thread's stack.
    fn run_on_small_stack(source: String) -> ExecutionResult {
        std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || execute(&source, &ScriptLimits::default()))
            .unwrap()
            .join()
            .unwrap()
    }

    #[test]
    fn test_deepest_accepted_nesting_fits_small_stack() {
        let depth = parser::MAX_DEPTH - 1;
        let source = format!("answer = {}1{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(run_on_small_stack(source), ExecutionResult::Answer(json!(1)));

        let source = format!("answer = 0{}", " + 1".repeat(depth - 1));
        assert_eq!(
            run_on_small_stack(source),
            ExecutionResult::Answer(json!(depth - 1))
        );

        let depth = parser::MAX_DEPTH + 1;
        let source = format!("answer = {}1{}", "(".repeat(depth), ")".repeat(depth));
        match run_on_small_stack(source) {
            ExecutionResult::Failure { diagnostic } => {
                assert!(diagnostic.contains("nested too deeply"), "{diagnostic}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_huge_slice_step_is_contained() {
        assert_eq!(answer("answer = [1, 2, 3][1::9223372036854775807]"), json!([2]));
        assert_eq!(answer("answer = 'abc'[1::9223372036854775807]"), json!("b"));
        assert_eq!(answer("answer = [1, 2, 3][1::-9223372036854775807]"), json!([2]));
        assert_eq!(answer("answer = 'abc'[::-9223372036854775807]"), json!("c"));
    }
}
