use winit::keyboard::{KeyCode, PhysicalKey};

/// Layout-independent name for a physical key, as used in key lists
/// (`equal`, `escape`, `5`, `a`, ...). Unmapped keys return `None`.
pub fn key_name(key: PhysicalKey) -> Option<&'static str> {
    let PhysicalKey::Code(code) = key else {
        return None;
    };
    let name = match code {
        KeyCode::Equal => "equal",
        KeyCode::Minus => "minus",
        KeyCode::Escape => "escape",
        KeyCode::Space => "space",
        KeyCode::Enter => "return",
        KeyCode::Tab => "tab",
        KeyCode::Backspace => "backspace",
        KeyCode::Backquote => "grave",
        KeyCode::Semicolon => "semicolon",
        KeyCode::Comma => "comma",
        KeyCode::Period => "period",
        KeyCode::Slash => "slash",
        KeyCode::ArrowLeft => "left",
        KeyCode::ArrowRight => "right",
        KeyCode::ArrowUp => "up",
        KeyCode::ArrowDown => "down",
        KeyCode::Digit0 => "0",
        KeyCode::Digit1 => "1",
        KeyCode::Digit2 => "2",
        KeyCode::Digit3 => "3",
        KeyCode::Digit4 => "4",
        KeyCode::Digit5 => "5",
        KeyCode::Digit6 => "6",
        KeyCode::Digit7 => "7",
        KeyCode::Digit8 => "8",
        KeyCode::Digit9 => "9",
        KeyCode::Numpad0 => "num_0",
        KeyCode::Numpad1 => "num_1",
        KeyCode::Numpad2 => "num_2",
        KeyCode::Numpad3 => "num_3",
        KeyCode::Numpad4 => "num_4",
        KeyCode::Numpad5 => "num_5",
        KeyCode::Numpad6 => "num_6",
        KeyCode::Numpad7 => "num_7",
        KeyCode::Numpad8 => "num_8",
        KeyCode::Numpad9 => "num_9",
        KeyCode::NumpadEnter => "num_enter",
        KeyCode::KeyA => "a",
        KeyCode::KeyB => "b",
        KeyCode::KeyC => "c",
        KeyCode::KeyD => "d",
        KeyCode::KeyE => "e",
        KeyCode::KeyF => "f",
        KeyCode::KeyG => "g",
        KeyCode::KeyH => "h",
        KeyCode::KeyI => "i",
        KeyCode::KeyJ => "j",
        KeyCode::KeyK => "k",
        KeyCode::KeyL => "l",
        KeyCode::KeyM => "m",
        KeyCode::KeyN => "n",
        KeyCode::KeyO => "o",
        KeyCode::KeyP => "p",
        KeyCode::KeyQ => "q",
        KeyCode::KeyR => "r",
        KeyCode::KeyS => "s",
        KeyCode::KeyT => "t",
        KeyCode::KeyU => "u",
        KeyCode::KeyV => "v",
        KeyCode::KeyW => "w",
        KeyCode::KeyX => "x",
        KeyCode::KeyY => "y",
        KeyCode::KeyZ => "z",
        _ => return None,
    };
    Some(name)
}
