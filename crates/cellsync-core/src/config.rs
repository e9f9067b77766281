//! Notebook configuration.

/// Configuration for a [`Notebook`](crate::Notebook).
#[derive(Debug, Clone)]
pub struct NotebookConfig {
    /// Re-segment the document on every edit.
    ///
    /// When disabled, edits only remap cell positions through the change
    /// set and the parse tree is marked stale until
    /// [`Notebook::reparse`](crate::Notebook::reparse) runs.
    pub reparse_on_edit: bool,

    /// Emit `delete` commands for cells the session has never seen.
    pub delete_unsent_cells: bool,
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            reparse_on_edit: true,
            delete_unsent_cells: false,
        }
    }
}

impl NotebookConfig {
    /// Configuration that defers segmentation until an explicit reparse.
    pub fn deferred() -> Self {
        Self {
            reparse_on_edit: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NotebookConfig::default();
        assert!(config.reparse_on_edit);
        assert!(!config.delete_unsent_cells);
    }

    #[test]
    fn test_deferred_config() {
        let config = NotebookConfig::deferred();
        assert!(!config.reparse_on_edit);
        assert!(!config.delete_unsent_cells);
    }
}
