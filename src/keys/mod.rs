//! Non-blocking key polling for interactive control.

#[cfg(windows)]
pub mod console;
#[cfg(unix)]
pub mod terminal;

use std::collections::VecDeque;
use std::io;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Up,
    Down,
    /// Ctrl-C, delivered as a key while the terminal is in raw mode.
    Interrupt,
}

pub trait KeySource {
    /// Return the next pressed key, if any, without blocking.
    fn poll(&mut self) -> io::Result<Option<Key>>;

    /// Block until any key is pressed.
    fn wait(&mut self) -> io::Result<Key> {
        loop {
            if let Some(key) = self.poll()? {
                return Ok(key);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

impl<T: KeySource + ?Sized> KeySource for Box<T> {
    fn poll(&mut self) -> io::Result<Option<Key>> {
        (**self).poll()
    }

    fn wait(&mut self) -> io::Result<Key> {
        (**self).wait()
    }
}

// IDLE ------------------------------------------------------------------------

/// Never reports a key. Used when stdin is not an interactive terminal.
#[derive(Debug, Default)]
pub struct IdleKeys;

impl KeySource for IdleKeys {
    fn poll(&mut self) -> io::Result<Option<Key>> {
        Ok(None)
    }

    fn wait(&mut self) -> io::Result<Key> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no interactive terminal to read a key from",
        ))
    }
}

// SCRIPTED --------------------------------------------------------------------

/// Replays a fixed script: each entry is what one `poll` call returns.
#[derive(Debug, Default)]
pub struct ScriptedKeys {
    script: VecDeque<Option<Key>>,
}

impl ScriptedKeys {
    pub fn new<I: IntoIterator<Item = Option<Key>>>(script: I) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    /// `idle_polls` empty polls followed by `key`.
    pub fn after(idle_polls: usize, key: Key) -> Self {
        Self::new(std::iter::repeat(None).take(idle_polls).chain([Some(key)]))
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl KeySource for ScriptedKeys {
    fn poll(&mut self) -> io::Result<Option<Key>> {
        Ok(self.script.pop_front().flatten())
    }

    fn wait(&mut self) -> io::Result<Key> {
        while let Some(entry) = self.script.pop_front() {
            if let Some(key) = entry {
                return Ok(key);
            }
        }
        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "key script exhausted",
        ))
    }
}

// PLATFORM DEFAULT ------------------------------------------------------------

/// The key source for the current terminal, or [`IdleKeys`] when there is no
/// interactive console.
pub fn platform_default() -> Box<dyn KeySource> {
    #[cfg(unix)]
    let source = terminal::RawTerminalKeys::new().map(|keys| Box::new(keys) as Box<dyn KeySource>);
    #[cfg(windows)]
    let source = console::ConsoleKeys::new().map(|keys| Box::new(keys) as Box<dyn KeySource>);
    #[cfg(not(any(unix, windows)))]
    let source: io::Result<Box<dyn KeySource>> = Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "key polling not supported on this platform",
    ));

    match source {
        Ok(keys) => keys,
        Err(e) => {
            warn!(error = %e, "key polling unavailable, interactive control disabled");
            Box::new(IdleKeys)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_keys_play_in_order() {
        let mut keys = ScriptedKeys::after(2, Key::Char('q'));
        assert_eq!(keys.poll().unwrap(), None);
        assert_eq!(keys.poll().unwrap(), None);
        assert_eq!(keys.poll().unwrap(), Some(Key::Char('q')));
        assert_eq!(keys.poll().unwrap(), None);
    }

    #[test]
    fn wait_skips_idle_entries() {
        let mut keys = ScriptedKeys::new([None, None, Some(Key::Up), Some(Key::Down)]);
        assert_eq!(keys.wait().unwrap(), Key::Up);
        assert_eq!(keys.remaining(), 1);
    }
}
