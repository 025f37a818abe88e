//! Session requests and their line encoding.
//!
//! ```text
//! ["call", "sum", {"class": "list", "value": [...]}]
//! ["set_vars", ["a", "b"], {"class": "list", "value": [...]}]
//! ["exec", "x = 2 ** 10", "str(x)"]
//! ["exec_file", "/path/to/funcs.py"]
//! EXIT
//! ```

use procbridge_core::wire::{self, CLASS_LIST};
use procbridge_core::{Error, Result, Value};
use serde_json::json;

/// Bare line that tells the peer to exit. It gets no reply.
pub const EXIT_SENTINEL: &str = "EXIT";

/// One request to the peer.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Evaluate `function` in the peer and apply it to `args`.
    Call { function: String, args: Vec<Value> },
    /// Bind each name to the value at the same position.
    SetVars { names: Vec<String>, values: Vec<Value> },
    /// Execute `code`, then evaluate `result_expr`.
    Exec { code: String, result_expr: String },
    /// Execute a source file in the peer's namespace.
    ExecFile { path: String },
    Exit,
}

impl Command {
    pub fn call(function: impl Into<String>, args: Vec<Value>) -> Self {
        Command::Call {
            function: function.into(),
            args,
        }
    }

    /// Pair names with values.
    ///
    /// # Errors
    ///
    /// `SizeMismatch` if the counts differ.
    pub fn set_vars(names: Vec<String>, values: Vec<Value>) -> Result<Self> {
        if names.len() != values.len() {
            return Err(Error::size_mismatch("set_vars values", names.len(), values.len()));
        }
        Ok(Command::SetVars { names, values })
    }

    pub fn exec(code: impl Into<String>, result_expr: impl Into<String>) -> Self {
        Command::Exec {
            code: code.into(),
            result_expr: result_expr.into(),
        }
    }

    pub fn exec_file(path: impl Into<String>) -> Self {
        Command::ExecFile { path: path.into() }
    }

    /// Short name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Call { .. } => "call",
            Command::SetVars { .. } => "set_vars",
            Command::Exec { .. } => "exec",
            Command::ExecFile { .. } => "exec_file",
            Command::Exit => "exit",
        }
    }

    /// Whether the peer answers this request with a line.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Command::Exit)
    }

    /// The request line, without its terminator.
    pub fn to_line(&self) -> Result<String> {
        let request = match self {
            Command::Call { function, args } => json!(["call", function, encode_args(args)?]),
            Command::SetVars { names, values } => {
                json!(["set_vars", names, encode_args(values)?])
            }
            Command::Exec { code, result_expr } => json!(["exec", code, result_expr]),
            Command::ExecFile { path } => json!(["exec_file", path]),
            Command::Exit => return Ok(EXIT_SENTINEL.to_string()),
        };
        Ok(serde_json::to_string(&request)?)
    }
}

fn encode_args(args: &[Value]) -> Result<serde_json::Value> {
    let encoded = args.iter().map(wire::to_wire).collect::<Result<Vec<_>>>()?;
    Ok(json!({ "class": CLASS_LIST, "value": encoded }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use procbridge_core::IntoArgs;

    fn parsed(command: &Command) -> serde_json::Value {
        serde_json::from_str(&command.to_line().unwrap()).unwrap()
    }

    #[test]
    fn call_line_carries_tuple_as_list() {
        let command = Command::call("sum", (vec![1i64, 2],).into_args());
        assert_eq!(
            parsed(&command),
            json!(["call", "sum", {"class": "list", "value": [
                {"class": "list", "value": [
                    {"class": "int", "value": 1},
                    {"class": "int", "value": 2}
                ]}
            ]}])
        );
    }

    #[test]
    fn set_vars_line() {
        let command =
            Command::set_vars(vec!["a".into(), "b".into()], (12i64, 34i64).into_args()).unwrap();
        let line = parsed(&command);
        assert_eq!(line[0], "set_vars");
        assert_eq!(line[1], json!(["a", "b"]));
        assert_eq!(line[2]["value"][1], json!({"class": "int", "value": 34}));
    }

    #[test]
    fn set_vars_counts_must_match() {
        let result = Command::set_vars(vec!["a".into(), "b".into()], (1i64,).into_args());
        assert!(matches!(
            result,
            Err(Error::SizeMismatch {
                expected: 2,
                found: 1,
                ..
            })
        ));
    }

    #[test]
    fn exec_and_exec_file_lines() {
        assert_eq!(
            parsed(&Command::exec("x = 1", "x")),
            json!(["exec", "x = 1", "x"])
        );
        assert_eq!(
            parsed(&Command::exec_file("funcs.py")),
            json!(["exec_file", "funcs.py"])
        );
    }

    #[test]
    fn multiline_code_stays_on_one_line() {
        let line = Command::exec("a = 1\nb = 2\n", "a + b").to_line().unwrap();
        assert!(!line.contains('\n'));
    }

    #[test]
    fn exit_is_bare_sentinel() {
        assert_eq!(Command::Exit.to_line().unwrap(), "EXIT");
        assert!(!Command::Exit.expects_reply());
        assert!(Command::exec("", "None").expects_reply());
    }

    #[test]
    fn non_finite_argument_fails_before_sending() {
        let command = Command::call("f", vec![Value::Float(f64::INFINITY)]);
        assert!(matches!(command.to_line(), Err(Error::Protocol { .. })));
    }
}
