use std::collections::VecDeque;
use std::io;
use std::mem::MaybeUninit;

use super::{Key, KeySource};

const ESC: u8 = 0x1b;
const ETX: u8 = 0x03;

/// Key polling on a unix terminal. Puts stdin into non-canonical, no-echo
/// mode with zero-length reads, and restores the original mode on drop.
///
/// Signal generation is off as well, so Ctrl-C arrives as
/// [`Key::Interrupt`] and the terminal is restored on the way out.
pub struct RawTerminalKeys {
    original: libc::termios,
    pending: VecDeque<u8>,
    // A partial escape sequence already waited one read for its tail.
    escape_held: bool,
}

impl RawTerminalKeys {
    pub fn new() -> io::Result<Self> {
        let fd = libc::STDIN_FILENO;
        if unsafe { libc::isatty(fd) } == 0 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stdin is not a terminal",
            ));
        }

        let mut original = MaybeUninit::<libc::termios>::uninit();
        if unsafe { libc::tcgetattr(fd, original.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let original = unsafe { original.assume_init() };

        let mut raw = original;
        raw.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ISIG);
        raw.c_cc[libc::VMIN] = 0;
        raw.c_cc[libc::VTIME] = 0;
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw) } != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            original,
            pending: VecDeque::new(),
            escape_held: false,
        })
    }

    fn fill(&mut self) -> io::Result<()> {
        let mut buf = [0u8; 16];
        let n = unsafe { libc::read(libc::STDIN_FILENO, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(()),
                _ => Err(err),
            };
        }
        self.pending.extend(&buf[..n as usize]);
        Ok(())
    }
}

impl KeySource for RawTerminalKeys {
    fn poll(&mut self) -> io::Result<Option<Key>> {
        if self.pending.is_empty() || partial_escape(&self.pending) {
            self.fill()?;
        }
        let key = decode(&mut self.pending, self.escape_held);
        self.escape_held = partial_escape(&self.pending);
        Ok(key)
    }
}

impl Drop for RawTerminalKeys {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &self.original);
        }
    }
}

/// True when the queue starts with an escape sequence whose tail has not
/// been read yet.
fn partial_escape(pending: &VecDeque<u8>) -> bool {
    match (pending.front(), pending.get(1), pending.len()) {
        (Some(&ESC), _, 1) => true,
        (Some(&ESC), Some(b'[' | b'O'), 2) => true,
        _ => false,
    }
}

/// Take one key off the front of the byte queue. Arrow keys arrive as
/// `ESC [ A` / `ESC [ B` (or `ESC O A` / `ESC O B` in application mode).
///
/// A partial escape sequence stays queued unless `flush` is set, in which
/// case its bytes are taken as plain keys.
fn decode(pending: &mut VecDeque<u8>, flush: bool) -> Option<Key> {
    if !flush && partial_escape(pending) {
        return None;
    }

    let first = pending.pop_front()?;
    match first {
        ETX => return Some(Key::Interrupt),
        ESC => {}
        _ => return Some(Key::Char(char::from(first))),
    }

    match (pending.front().copied(), pending.get(1).copied()) {
        (Some(b'[' | b'O'), Some(code)) => {
            pending.drain(..2);
            match code {
                b'A' => Some(Key::Up),
                b'B' => Some(Key::Down),
                _ => None,
            }
        }
        _ => Some(Key::Char(char::from(ESC))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Option<Key>> {
        let mut pending: VecDeque<u8> = bytes.iter().copied().collect();
        let mut keys = Vec::new();
        while !pending.is_empty() {
            keys.push(decode(&mut pending, true));
        }
        keys
    }

    #[test]
    fn plain_characters() {
        assert_eq!(
            decode_all(b"q "),
            vec![Some(Key::Char('q')), Some(Key::Char(' '))]
        );
    }

    #[test]
    fn arrow_sequences() {
        assert_eq!(
            decode_all(b"\x1b[A\x1b[B\x1bOA"),
            vec![Some(Key::Up), Some(Key::Down), Some(Key::Up)]
        );
    }

    #[test]
    fn unknown_escape_sequence_is_swallowed() {
        assert_eq!(decode_all(b"\x1b[Cq"), vec![None, Some(Key::Char('q'))]);
    }

    #[test]
    fn lone_escape_is_a_key() {
        assert_eq!(decode_all(b"\x1b"), vec![Some(Key::Char('\x1b'))]);
    }

    #[test]
    fn ctrl_c_is_an_interrupt() {
        assert_eq!(
            decode_all(b"\x03q"),
            vec![Some(Key::Interrupt), Some(Key::Char('q'))]
        );
    }

    #[test]
    fn split_arrow_sequence_waits_for_its_tail() {
        let mut pending: VecDeque<u8> = [ESC].into_iter().collect();
        assert_eq!(decode(&mut pending, false), None);
        assert_eq!(pending.len(), 1);

        pending.push_back(b'[');
        assert_eq!(decode(&mut pending, false), None);
        assert_eq!(pending.len(), 2);

        pending.push_back(b'A');
        assert_eq!(decode(&mut pending, false), Some(Key::Up));
        assert!(pending.is_empty());
    }

    #[test]
    fn held_escape_is_released_when_no_tail_arrives() {
        let mut pending: VecDeque<u8> = [ESC].into_iter().collect();
        assert!(partial_escape(&pending));
        assert_eq!(decode(&mut pending, true), Some(Key::Char('\x1b')));
        assert!(pending.is_empty());
    }
}
