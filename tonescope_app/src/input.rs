//! Keyboard control from stdin. Keys are read a line at a time.
//!
//! | key      | action           |
//! |----------|------------------|
//! | `c`      | next waveform    |
//! | `+` `=`  | frequency up     |
//! | `-`      | frequency down   |
//! | `u`      | amplitude up     |
//! | `d`      | amplitude down   |
//! | space `p`| play / pause     |
//! | `q`      | quit             |

use std::io::BufRead;
use std::thread;

use crossbeam::channel::{Receiver, Sender, unbounded};
use tonescope_backend::ControlEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Control(ControlEvent),
    Quit,
}

pub fn map_key(key: char) -> Option<Input> {
    let input = match key {
        'c' | 'C' => Input::Control(ControlEvent::NextWaveform),
        '+' | '=' => Input::Control(ControlEvent::FrequencyUp),
        '-' | '_' => Input::Control(ControlEvent::FrequencyDown),
        'u' | 'U' => Input::Control(ControlEvent::AmplitudeUp),
        'd' | 'D' => Input::Control(ControlEvent::AmplitudeDown),
        ' ' | 'p' | 'P' => Input::Control(ControlEvent::TogglePlayback),
        'q' | 'Q' => Input::Quit,
        _ => return None,
    };
    Some(input)
}

/// Spawn a thread forwarding stdin keys. The channel closes with stdin.
pub fn spawn_stdin_reader() -> std::io::Result<Receiver<Input>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("stdin-keys".into())
        .spawn(move || read_keys(std::io::stdin().lock(), &tx))?;
    Ok(rx)
}

fn read_keys(reader: impl BufRead, tx: &Sender<Input>) {
    for line in reader.lines() {
        let Ok(line) = line else { break };
        for input in line.chars().filter_map(map_key) {
            if tx.send(input).is_err() {
                return;
            }
        }
    }
    log::debug!("read_keys: stdin closed");
}
