// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::chroma::{Chroma, LabelStyle};
use crate::session::{AUTO_ANSWER_SET, OUT_LABEL};

const START: &str = "start";
const REPLAY: &str = "replay";
const STOP: &str = "stop";
const SET: &str = "set";
const LEVEL: &str = "level";
const RANGE: &str = "range";
const SPECIAL: &str = "special";
const ANSWERS: &str = "answers";
const STATS: &str = "stats";
const QUIT: &str = "quit";

/// A controller that drives a session from typed commands and answers.
pub struct Driver {
    label_style: LabelStyle,
}

impl Driver {
    pub fn new(label_style: LabelStyle) -> Driver {
        Driver { label_style }
    }

    /// Reads one line and sends the matching event. Returns false once input is closed
    /// or a quit was sent.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        label_style: LabelStyle,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Answer, or command ({}, {}, {}, {} <n>, {} <n>, {} on|off, {} on|off, {} <set>|off, {}, {}): ",
            START, REPLAY, STOP, SET, LEVEL, RANGE, SPECIAL, ANSWERS, STATS, QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            info!("Keyboard input closed.");
            events_tx
                .blocking_send(Event::Quit)
                .map_err(io::Error::other)?;
            return Ok(false);
        }

        let event = match parse(input.trim(), label_style) {
            Some(event) => event,
            None => {
                warn!(input = input.trim(), "Unrecognized input");
                return Ok(true);
            }
        };
        let quit = event == Event::Quit;
        events_tx.blocking_send(event).map_err(io::Error::other)?;
        Ok(!quit)
    }
}

/// Parses a command, or failing that, an answer label.
fn parse(input: &str, label_style: LabelStyle) -> Option<Event> {
    let mut words = input.split_whitespace();
    let command = words.next()?.to_lowercase();
    let argument = words.collect::<Vec<&str>>().join(" ");

    let event = match (command.as_str(), argument.as_str()) {
        (START, "") => Event::Start,
        (REPLAY, "") => Event::Replay,
        (STOP, "") => Event::Stop,
        (STATS, "") => Event::Stats,
        (QUIT, "") => Event::Quit,
        (SET, index) => Event::SelectSet(index.parse().ok()?),
        (LEVEL, level) => Event::Level(level.parse().ok()?),
        (RANGE, toggle) => Event::ReducedRange(parse_toggle(toggle)?),
        (SPECIAL, toggle) => Event::Special(parse_toggle(toggle)?),
        (ANSWERS, "off") => Event::AnswerSet(None),
        (ANSWERS, name) if name.eq_ignore_ascii_case(AUTO_ANSWER_SET) => {
            Event::AnswerSet(Some(AUTO_ANSWER_SET.to_string()))
        }
        (ANSWERS, name) if !name.is_empty() => Event::AnswerSet(Some(name.to_string())),
        _ if input.eq_ignore_ascii_case(OUT_LABEL) => Event::Answer(OUT_LABEL.to_string()),
        _ => {
            Chroma::parse_styled(input, label_style).ok()?;
            Event::Answer(input.to_string())
        }
    };
    Some(event)
}

fn parse_toggle(toggle: &str) -> Option<bool> {
    match toggle.to_lowercase().as_str() {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        let label_style = self.label_style;
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, label_style, io::stdin().lock(), io::stdout())? {}
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, BufReader, BufWriter};

    use tokio::sync::mpsc;

    use crate::controller::{keyboard::*, Event};

    use super::Driver;

    fn get_event(input: &str, label_style: LabelStyle) -> Result<(bool, Option<Event>), io::Error> {
        let (sender, mut receiver) = mpsc::channel::<Event>(1);

        let reader = BufReader::new(input.as_bytes());

        let writer_bytes: Vec<u8> = vec![0; 255];
        let writer = BufWriter::new(writer_bytes);
        let more = Driver::monitor_io(&sender, label_style, reader, writer)?;

        // Force the sender to close.
        drop(sender);
        Ok((more, receiver.blocking_recv()))
    }

    fn event(input: &str) -> Option<Event> {
        get_event(input, LabelStyle::Standard)
            .expect("monitor io")
            .1
    }

    #[test]
    fn test_keyboard_commands() {
        assert_eq!(Some(Event::Start), event(START));
        assert_eq!(Some(Event::Replay), event(" Replay\n"));
        assert_eq!(Some(Event::Stop), event(STOP));
        assert_eq!(Some(Event::Stats), event(STATS));
        assert_eq!(Some(Event::SelectSet(3)), event("set 3"));
        assert_eq!(Some(Event::Level(7)), event("level 7"));
        assert_eq!(Some(Event::ReducedRange(true)), event("range on"));
        assert_eq!(Some(Event::Special(false)), event("special OFF"));
        assert_eq!(Some(Event::AnswerSet(None)), event("answers off"));
        assert_eq!(
            Some(Event::AnswerSet(Some("Auto".to_string()))),
            event("answers auto")
        );
        assert_eq!(
            Some(Event::AnswerSet(Some("Tritones 1".to_string()))),
            event("answers Tritones 1")
        );
        assert_eq!(None, event("set x"));
        assert_eq!(None, event("range maybe"));
        assert_eq!(None, event("unrecognized"));
    }

    #[test]
    fn test_keyboard_answers() {
        assert_eq!(Some(Event::Answer("F#".to_string())), event("F#"));
        assert_eq!(Some(Event::Answer("OUT".to_string())), event("out"));
        assert_eq!(None, event("H"));

        // Cryptic labels are only accepted in cryptic mode.
        let cryptic = Chroma::from_note(62).display(LabelStyle::Cryptic);
        assert_eq!(
            Some(Event::Answer(cryptic.to_string())),
            get_event(cryptic, LabelStyle::Cryptic).expect("monitor io").1
        );
    }

    #[test]
    fn test_quit_and_closed_input() -> Result<(), io::Error> {
        assert_eq!((false, Some(Event::Quit)), get_event(QUIT, LabelStyle::Standard)?);
        assert_eq!((false, Some(Event::Quit)), get_event("", LabelStyle::Standard)?);
        assert_eq!((true, Some(Event::Start)), get_event(START, LabelStyle::Standard)?);
        Ok(())
    }
}
