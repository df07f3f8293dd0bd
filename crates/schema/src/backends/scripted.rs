//! Scripted database handle
//!
//! A [`Database`] that answers statements from an ordered list of rules
//! instead of a server, and records every statement it receives. Used by the
//! test suite and handy for dry runs of the engines.
//!
//! Rules match when their pattern is a case-insensitive substring of the
//! statement; the first matching rule wins. One-shot rules are consumed after
//! answering once, which makes it easy to script a sequence of different
//! answers to the same query. Unmatched statements succeed with an empty
//! result.

use std::sync::Mutex;

use async_trait::async_trait;

use super::core::{Database, QueryOutput};
use crate::error::{SchemaError, SchemaResult};

type Handler = Box<dyn FnMut(&str) -> SchemaResult<QueryOutput> + Send>;

enum Responder {
    Output(QueryOutput),
    Error(String),
    Handler(Handler),
}

struct Rule {
    pattern: String,
    responder: Responder,
    once: bool,
}

#[derive(Default)]
struct ScriptState {
    rules: Vec<Rule>,
    log: Vec<String>,
    last_error: Option<String>,
}

/// Database handle driven by scripted rules
#[derive(Default)]
pub struct ScriptedDatabase {
    state: Mutex<ScriptState>,
}

impl ScriptedDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer statements containing `pattern` with `output`
    pub fn respond(&self, pattern: &str, output: QueryOutput) -> &Self {
        self.push(pattern, Responder::Output(output), false)
    }

    /// Answer the next statement containing `pattern` with `output`
    pub fn respond_once(&self, pattern: &str, output: QueryOutput) -> &Self {
        self.push(pattern, Responder::Output(output), true)
    }

    /// Always fail statements containing `pattern`
    pub fn fail(&self, pattern: &str, message: &str) -> &Self {
        self.push(pattern, Responder::Error(message.to_string()), false)
    }

    /// Fail the next statement containing `pattern`
    pub fn fail_once(&self, pattern: &str, message: &str) -> &Self {
        self.push(pattern, Responder::Error(message.to_string()), true)
    }

    /// Answer statements containing `pattern` by calling `handler`
    pub fn handle<F>(&self, pattern: &str, handler: F) -> &Self
    where
        F: FnMut(&str) -> SchemaResult<QueryOutput> + Send + 'static,
    {
        self.push(pattern, Responder::Handler(Box::new(handler)), false)
    }

    /// Every statement received so far, in order
    pub fn statements(&self) -> Vec<String> {
        self.with_state(|state| state.log.clone())
    }

    /// Statements containing `pattern`, in order
    pub fn statements_matching(&self, pattern: &str) -> Vec<String> {
        let needle = pattern.to_lowercase();
        self.statements()
            .into_iter()
            .filter(|sql| sql.to_lowercase().contains(&needle))
            .collect()
    }

    /// Whether any statement containing `pattern` was received
    pub fn executed(&self, pattern: &str) -> bool {
        !self.statements_matching(pattern).is_empty()
    }

    pub fn clear_log(&self) {
        self.with_state(|state| state.log.clear());
    }

    fn push(&self, pattern: &str, responder: Responder, once: bool) -> &Self {
        self.with_state(|state| {
            state.rules.push(Rule {
                pattern: pattern.to_lowercase(),
                responder,
                once,
            })
        });
        self
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ScriptState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl Database for ScriptedDatabase {
    async fn execute(&self, sql: &str) -> SchemaResult<QueryOutput> {
        self.with_state(|state| {
            state.log.push(sql.to_string());
            let lowered = sql.to_lowercase();

            let Some(position) = state
                .rules
                .iter()
                .position(|rule| lowered.contains(&rule.pattern))
            else {
                state.last_error = None;
                return Ok(QueryOutput::default());
            };

            let result = if state.rules[position].once {
                let rule = state.rules.remove(position);
                match rule.responder {
                    Responder::Output(output) => Ok(output),
                    Responder::Error(message) => Err(SchemaError::Database(message)),
                    Responder::Handler(mut handler) => handler(sql),
                }
            } else {
                match &mut state.rules[position].responder {
                    Responder::Output(output) => Ok(output.clone()),
                    Responder::Error(message) => Err(SchemaError::Database(message.clone())),
                    Responder::Handler(handler) => handler(sql),
                }
            };

            state.last_error = match &result {
                Ok(_) => None,
                Err(e) => Some(e.to_string()),
            };
            result
        })
    }

    fn last_error(&self) -> Option<String> {
        self.with_state(|state| state.last_error.clone())
    }
}
