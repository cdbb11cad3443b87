use std::io::{self, Write};

use crossterm::style::{StyledContent, Stylize};

use super::task::TaskStatus;

pub type EntryId = usize;

/// Write-only sink that shows the state of every task.
pub trait StatusDisplay {
    fn add_entry(&mut self, label: &str, status: TaskStatus) -> EntryId;
    fn set_status(&mut self, entry: EntryId, status: TaskStatus);
    fn clear(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusItem {
    pub label: String,
    pub status: TaskStatus,
}

#[derive(Debug, Default)]
pub struct StatusList {
    items: Vec<StatusItem>,
}

impl StatusList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[StatusItem] {
        &self.items
    }

    pub fn get(&self, entry: EntryId) -> Option<&StatusItem> {
        self.items.get(entry)
    }
}

impl StatusDisplay for StatusList {
    fn add_entry(&mut self, label: &str, status: TaskStatus) -> EntryId {
        self.items.push(StatusItem {
            label: label.to_string(),
            status,
        });
        self.items.len() - 1
    }

    fn set_status(&mut self, entry: EntryId, status: TaskStatus) {
        if let Some(item) = self.items.get_mut(entry) {
            item.status = status;
        }
    }

    fn clear(&mut self) {
        self.items.clear();
    }
}

/// `StatusList` that echoes every change to the terminal.
#[derive(Debug, Default)]
pub struct ConsoleStatus {
    list: StatusList,
}

impl ConsoleStatus {
    pub fn new() -> Self {
        Self::default()
    }

    fn print(&self, entry: EntryId) {
        if let Some(item) = self.list.get(entry) {
            println!("\r[{}] {}", styled(item.status), item.label);
            let _ = io::stdout().flush();
        }
    }
}

impl StatusDisplay for ConsoleStatus {
    fn add_entry(&mut self, label: &str, status: TaskStatus) -> EntryId {
        self.list.add_entry(label, status)
    }

    fn set_status(&mut self, entry: EntryId, status: TaskStatus) {
        self.list.set_status(entry, status);
        self.print(entry);
    }

    fn clear(&mut self) {
        self.list.clear();
    }
}

pub fn styled(status: TaskStatus) -> StyledContent<String> {
    let text = format!("{:^7}", status.as_str());
    match status {
        TaskStatus::Good => text.green(),
        TaskStatus::Bad => text.red(),
        TaskStatus::Active => text.cyan(),
        TaskStatus::Warn => text.yellow(),
        TaskStatus::Open | TaskStatus::Unknown => text.dark_grey(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_insertion_order() {
        let mut list = StatusList::new();
        let a = list.add_entry("first", TaskStatus::Open);
        let b = list.add_entry("second", TaskStatus::Open);
        list.set_status(b, TaskStatus::Good);

        assert_eq!(a, 0);
        assert_eq!(list.items()[0].status, TaskStatus::Open);
        assert_eq!(list.items()[1].label, "second");
        assert_eq!(list.items()[1].status, TaskStatus::Good);
    }

    #[test]
    fn unknown_entry_is_ignored() {
        let mut list = StatusList::new();
        list.set_status(7, TaskStatus::Bad);
        assert!(list.items().is_empty());
    }
}
