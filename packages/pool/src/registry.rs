//! Named task entry points.

use std::collections::BTreeMap;
use std::fmt;

use procbridge_core::{FromValue, Result, Value};

/// A task body: one argument in, one result out.
pub type TaskFn = dyn Fn(Value) -> Result<Value> + Send + Sync;

/// Tasks a worker process can run, by name.
///
/// Closures cannot cross a process boundary, so the parent names a task and
/// the worker (a fresh process running the same registry) looks it up.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, Box<TaskFn>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task over dynamic values. A later registration under the
    /// same name replaces the earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, task: F) -> &mut Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.tasks.insert(name.into(), Box::new(task));
        self
    }

    /// Register a task over native types; the argument is decoded before the
    /// call and the result encoded after it.
    pub fn register_typed<A, R, F>(&mut self, name: impl Into<String>, task: F) -> &mut Self
    where
        A: FromValue,
        R: Into<Value>,
        F: Fn(A) -> Result<R> + Send + Sync + 'static,
    {
        self.register(name, move |value| task(A::from_value(value)?).map(Into::into))
    }

    pub fn get(&self, name: &str) -> Option<&TaskFn> {
        self.tasks.get(name).map(|task| task.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.tasks.keys().collect::<Vec<_>>())
            .finish()
    }
}
