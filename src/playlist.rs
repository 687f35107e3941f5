//! Ordered list of clips and their repeat intervals
//!
//! Items are identified by position. Two items may point at the same file.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Playlist shared between the control layer and the playback worker
pub type SharedPlaylist = Arc<RwLock<Playlist>>;

/// One scheduled clip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioItem {
    /// Sound file to play
    pub path: PathBuf,

    /// Minutes to wait after the clip before moving on
    pub interval: u32,
}

impl AudioItem {
    /// Create an item, rejecting a zero interval
    pub fn new(path: impl Into<PathBuf>, interval: u32) -> Result<Self, SchedulerError> {
        if interval == 0 {
            return Err(SchedulerError::InvalidInterval);
        }
        Ok(Self {
            path: path.into(),
            interval,
        })
    }

    /// Wait length, given how long one interval minute lasts
    pub fn wait_duration(&self, minute: Duration) -> Duration {
        minute.saturating_mul(self.interval)
    }

    /// File name for display, falling back to the full path
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Whether the file is currently on disk
    pub fn is_playable(&self) -> bool {
        self.path.exists()
    }
}

/// Direction for reordering an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playlist {
    items: Vec<AudioItem>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<AudioItem>) -> Self {
        Self { items }
    }

    pub fn into_shared(self) -> SharedPlaylist {
        Arc::new(RwLock::new(self))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&AudioItem> {
        self.items.get(index)
    }

    pub fn items(&self) -> &[AudioItem] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &AudioItem> {
        self.items.iter()
    }

    fn check_index(&self, index: usize) -> Result<(), SchedulerError> {
        if index >= self.items.len() {
            return Err(SchedulerError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        Ok(())
    }

    /// Append an item at the end
    pub fn push(&mut self, item: AudioItem) {
        self.items.push(item);
    }

    pub fn remove(&mut self, index: usize) -> Result<AudioItem, SchedulerError> {
        self.check_index(index)?;
        Ok(self.items.remove(index))
    }

    /// Change an item's interval in place
    pub fn set_interval(&mut self, index: usize, interval: u32) -> Result<(), SchedulerError> {
        if interval == 0 {
            return Err(SchedulerError::InvalidInterval);
        }
        self.check_index(index)?;
        self.items[index].interval = interval;
        Ok(())
    }

    /// Swap an item with its neighbour and return where it ended up.
    /// Moving past either end leaves the list unchanged.
    pub fn move_item(&mut self, index: usize, direction: MoveDirection) -> Result<usize, SchedulerError> {
        self.check_index(index)?;
        let target = match direction {
            MoveDirection::Up => index.checked_sub(1),
            MoveDirection::Down => Some(index + 1).filter(|t| *t < self.items.len()),
        };

        match target {
            Some(target) => {
                self.items.swap(index, target);
                Ok(target)
            }
            None => Ok(index),
        }
    }

    /// First index at or after `start` (wrapping) whose file exists
    pub fn first_playable_from(&self, start: usize) -> Option<usize> {
        let len = self.items.len();
        (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&i| self.items[i].is_playable())
    }
}

impl From<Vec<AudioItem>> for Playlist {
    fn from(items: Vec<AudioItem>) -> Self {
        Self::from_items(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, interval: u32) -> AudioItem {
        AudioItem::new(name, interval).unwrap()
    }

    fn playlist(names: &[&str]) -> Playlist {
        Playlist::from_items(names.iter().map(|n| item(n, 1)).collect())
    }

    fn names(playlist: &Playlist) -> Vec<String> {
        playlist.iter().map(|i| i.display_name()).collect()
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(matches!(
            AudioItem::new("a.wav", 0),
            Err(SchedulerError::InvalidInterval)
        ));

        let mut list = playlist(&["a.wav"]);
        assert!(list.set_interval(0, 0).is_err());
        assert_eq!(list.get(0).unwrap().interval, 1);
    }

    #[test]
    fn test_wait_duration_scales_with_unit() {
        let item = item("a.wav", 5);
        assert_eq!(item.wait_duration(Duration::from_secs(60)), Duration::from_secs(300));
        assert_eq!(
            item.wait_duration(Duration::from_millis(10)),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn test_display_name_uses_file_name() {
        let item = item("/music/alerts/bell.wav", 1);
        assert_eq!(item.display_name(), "bell.wav");
    }

    #[test]
    fn test_duplicate_paths_allowed() {
        let list = playlist(&["a.wav", "a.wav"]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_move_up_and_down() {
        let mut list = playlist(&["a.wav", "b.wav", "c.wav"]);

        assert_eq!(list.move_item(2, MoveDirection::Up).unwrap(), 1);
        assert_eq!(names(&list), ["a.wav", "c.wav", "b.wav"]);

        assert_eq!(list.move_item(0, MoveDirection::Down).unwrap(), 1);
        assert_eq!(names(&list), ["c.wav", "a.wav", "b.wav"]);
    }

    #[test]
    fn test_move_past_ends_is_noop() {
        let mut list = playlist(&["a.wav", "b.wav"]);
        assert_eq!(list.move_item(0, MoveDirection::Up).unwrap(), 0);
        assert_eq!(list.move_item(1, MoveDirection::Down).unwrap(), 1);
        assert_eq!(names(&list), ["a.wav", "b.wav"]);
    }

    #[test]
    fn test_out_of_range_operations() {
        let mut list = playlist(&["a.wav"]);
        assert!(matches!(
            list.remove(3),
            Err(SchedulerError::IndexOutOfRange { index: 3, len: 1 })
        ));
        assert!(list.move_item(1, MoveDirection::Up).is_err());
        assert!(list.set_interval(1, 5).is_err());
    }

    #[test]
    fn test_first_playable_wraps_around() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.wav");
        std::fs::write(&real, b"x").unwrap();

        let list = Playlist::from_items(vec![
            item(real.to_str().unwrap(), 1),
            item("/missing/one.wav", 1),
            item("/missing/two.wav", 1),
        ]);

        assert_eq!(list.first_playable_from(1), Some(0));
        assert_eq!(playlist(&["/missing/x.wav"]).first_playable_from(0), None);
        assert_eq!(Playlist::new().first_playable_from(0), None);
    }
}
