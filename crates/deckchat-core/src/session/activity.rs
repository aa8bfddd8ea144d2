//! Live view of which agent tool is running.

/// Derived tool state for the exchange in progress.
///
/// Tool calls are not nested: a second `tool_start` before `tool_end`
/// replaces the current tool and still lands in the history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolActivity {
    active: bool,
    current_tool: Option<String>,
    history: Vec<String>,
}

impl ToolActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn current_tool(&self) -> Option<&str> {
        self.current_tool.as_deref()
    }

    /// Tools started during this exchange, oldest first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn tool_start(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.active = true;
        self.current_tool = Some(name.clone());
        self.history.push(name);
    }

    pub fn tool_end(&mut self) {
        self.active = false;
        self.current_tool = None;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
