//! Lookup lists loaded once at startup from `<root>/<category>/<field>` files,
//! one value per line. Unreadable entries are logged and skipped.

use crate::error::AppError;
use std::collections::HashMap;
use std::path::Path;

#[derive(Clone, Debug, Default)]
pub struct LookupLists {
    by_category: HashMap<String, HashMap<String, Vec<String>>>,
}

impl LookupLists {
    pub fn new() -> Self {
        LookupLists::default()
    }

    pub fn get(&self, category: &str, field: &str) -> Option<&[String]> {
        self.by_category
            .get(category)
            .and_then(|fields| fields.get(field))
            .map(Vec::as_slice)
    }

    /// Field lists of one category (typically an entity model name).
    pub fn fields(&self, category: &str) -> Option<&HashMap<String, Vec<String>>> {
        self.by_category.get(category)
    }

    pub fn insert(&mut self, category: impl Into<String>, field: impl Into<String>, values: Vec<String>) {
        self.by_category
            .entry(category.into())
            .or_default()
            .insert(field.into(), values);
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty()
    }
}

/// Split file contents into list values, dropping empty lines.
pub fn parse_list(contents: &str) -> Vec<String> {
    contents
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load every list under `root`. Creates `root` when missing; only that step can fail.
pub async fn load_lists(root: &Path) -> Result<LookupLists, AppError> {
    tracing::info!(path = %root.display(), "loading lookup lists");
    tokio::fs::create_dir_all(root).await?;
    let mut lists = LookupLists::new();

    let mut categories = match tokio::fs::read_dir(root).await {
        Ok(rd) => rd,
        Err(e) => {
            tracing::error!(path = %root.display(), error = %e, "cannot read lists directory");
            return Ok(lists);
        }
    };
    loop {
        let entry = match categories.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(path = %root.display(), error = %e, "error listing lists directory");
                break;
            }
        };
        let category_path = entry.path();
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            tracing::debug!(path = %category_path.display(), "skipping non-directory entry");
            continue;
        }
        let category = entry.file_name().to_string_lossy().into_owned();
        load_category(&mut lists, &category, &category_path).await;
    }

    tracing::info!(categories = lists.by_category.len(), "lookup lists loaded");
    Ok(lists)
}

async fn load_category(lists: &mut LookupLists, category: &str, dir: &Path) {
    let mut files = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) => {
            tracing::error!(path = %dir.display(), error = %e, "error reading file list");
            return;
        }
    };
    lists.by_category.entry(category.to_string()).or_default();
    loop {
        let entry = match files.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(path = %dir.display(), error = %e, "error reading file list");
                break;
            }
        };
        let path = entry.path();
        let field = entry.file_name().to_string_lossy().into_owned();
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let values = parse_list(&String::from_utf8_lossy(&bytes));
                tracing::debug!(path = %path.display(), values = values.len(), "list loaded");
                lists.insert(category, field, values);
            }
            Err(e) => tracing::error!(path = %path.display(), error = %e, "error reading list file"),
        }
    }
}
