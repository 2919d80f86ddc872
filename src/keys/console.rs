use std::io;

use winapi::shared::minwindef::DWORD;
use winapi::um::consoleapi::{GetConsoleMode, GetNumberOfConsoleInputEvents, ReadConsoleInputW};
use winapi::um::handleapi::INVALID_HANDLE_VALUE;
use winapi::um::processenv::GetStdHandle;
use winapi::um::winbase::STD_INPUT_HANDLE;
use winapi::um::wincontypes::{INPUT_RECORD, KEY_EVENT};
use winapi::um::winnt::HANDLE;
use winapi::um::winuser::{VK_DOWN, VK_UP};

use super::{Key, KeySource};

/// Key polling on the Windows console input buffer.
pub struct ConsoleKeys {
    handle: HANDLE,
}

impl ConsoleKeys {
    pub fn new() -> io::Result<Self> {
        let handle = unsafe { GetStdHandle(STD_INPUT_HANDLE) };
        if handle.is_null() || handle == INVALID_HANDLE_VALUE {
            return Err(io::Error::last_os_error());
        }

        let mut mode: DWORD = 0;
        if unsafe { GetConsoleMode(handle, &mut mode) } == 0 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stdin is not a console",
            ));
        }

        Ok(Self { handle })
    }
}

impl KeySource for ConsoleKeys {
    fn poll(&mut self) -> io::Result<Option<Key>> {
        loop {
            let mut available: DWORD = 0;
            if unsafe { GetNumberOfConsoleInputEvents(self.handle, &mut available) } == 0 {
                return Err(io::Error::last_os_error());
            }
            if available == 0 {
                return Ok(None);
            }

            let mut record: INPUT_RECORD = unsafe { std::mem::zeroed() };
            let mut read: DWORD = 0;
            if unsafe { ReadConsoleInputW(self.handle, &mut record, 1, &mut read) } == 0 {
                return Err(io::Error::last_os_error());
            }
            if read == 0 || record.EventType != KEY_EVENT {
                continue;
            }

            let event = unsafe { record.Event.KeyEvent() };
            if event.bKeyDown == 0 {
                continue;
            }

            match i32::from(event.wVirtualKeyCode) {
                VK_UP => return Ok(Some(Key::Up)),
                VK_DOWN => return Ok(Some(Key::Down)),
                _ => {}
            }

            let unit = unsafe { *event.uChar.UnicodeChar() };
            if let Some(c) = char::from_u32(u32::from(unit)).filter(|c| *c != '\0') {
                return Ok(Some(Key::Char(c)));
            }
        }
    }
}
