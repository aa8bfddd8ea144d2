//! Interactive chat session.
//!
//! Plain lines are sent as messages; lines starting with `:` edit the deck
//! or control the session.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use deckchat_core::client::ChatClient;
use deckchat_core::config::Config;
use deckchat_core::deck::{Direction, SlidePatch};
use deckchat_core::models::Presentation;
use deckchat_core::session::Session;

use super::export;
use crate::cli::render;

const HELP: &str = "\
Commands:
  :q                      quit
  :clear                  start a new conversation
  :deck                   show the current deck
  :add <n>                add chart n of the last reply to the deck
  :title <slide> <text>   retitle a slide
  :notes <slide> <text>   set speaker notes (empty text clears)
  :del <slide>            delete a slide
  :up <slide>             move a slide up
  :down <slide>           move a slide down
  :suggest <n>            send suggestion n of the last reply
  :preview                show the server's preview of the deck
  :export [path]          capture charts and export the deck
Slides are addressed by position (1, 2, ...) or id (slide-3).";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Empty,
    Message(String),
    Quit,
    Help,
    Clear,
    ShowDeck,
    AddChart(usize),
    Title(String, String),
    Notes(String, String),
    Delete(String),
    Move(String, Direction),
    Suggest(usize),
    Preview,
    Export(Option<PathBuf>),
    Invalid(String),
}

fn parse_line(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix(':') else {
        return Input::Message(line.to_string());
    };

    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(name, rest)| (name, rest.trim()));
    let (first, tail) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(first, tail)| (first, tail.trim()));

    let slide_arg = |build: fn(String) -> Input| {
        if first.is_empty() {
            Input::Invalid(format!(":{name} needs a slide"))
        } else {
            build(first.to_string())
        }
    };
    let number_arg = |build: fn(usize) -> Input| match first.parse::<usize>() {
        Ok(n) if n > 0 => build(n),
        _ => Input::Invalid(format!(":{name} needs a number starting at 1")),
    };

    match name {
        "q" | "quit" => Input::Quit,
        "h" | "help" => Input::Help,
        "clear" => Input::Clear,
        "deck" => Input::ShowDeck,
        "add" => number_arg(Input::AddChart),
        "suggest" => number_arg(Input::Suggest),
        "title" if !first.is_empty() && !tail.is_empty() => {
            Input::Title(first.to_string(), tail.to_string())
        }
        "title" => Input::Invalid(":title needs a slide and text".to_string()),
        "notes" if !first.is_empty() => Input::Notes(first.to_string(), tail.to_string()),
        "notes" => Input::Invalid(":notes needs a slide".to_string()),
        "del" => slide_arg(Input::Delete),
        "up" => slide_arg(|slide| Input::Move(slide, Direction::Up)),
        "down" => slide_arg(|slide| Input::Move(slide, Direction::Down)),
        "preview" => Input::Preview,
        "export" => Input::Export((!rest.is_empty()).then(|| PathBuf::from(rest))),
        other => Input::Invalid(format!("Unknown command :{other} (try :help)")),
    }
}

/// Resolves a position (`2`) or an id (`slide-2`) to a slide id.
fn resolve_slide(deck: &Presentation, reference: &str) -> Option<String> {
    if let Ok(position) = reference.parse::<usize>() {
        return deck
            .slides
            .get(position.checked_sub(1)?)
            .map(|s| s.id.clone());
    }
    deck.slide(reference).map(|s| s.id.clone())
}

pub async fn run(config: &Config) -> Result<()> {
    let client = ChatClient::from_config(config)?;
    let rasterizer = export::rasterizer(config);
    let mut session = Session::new();

    println!("deckchat connected to {} (:help for commands)", client.base_url());

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush().context("flush stdout")?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("read input")?;

        match parse_line(&line) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Help => println!("{HELP}"),
            Input::Message(text) => send(&mut session, &client, &text).await,
            Input::Suggest(n) => {
                let suggestion = session
                    .conversation
                    .last_reply()
                    .and_then(|m| m.suggestions.get(n - 1))
                    .cloned();
                match suggestion {
                    Some(text) => {
                        println!("> {text}");
                        send(&mut session, &client, &text).await;
                    }
                    None => eprintln!("No suggestion {n}"),
                }
            }
            Input::Clear => {
                session.clear(&client).await;
                println!("Started a new conversation");
            }
            Input::ShowDeck => match session.deck.current() {
                Some(deck) => println!("{}", render::deck(deck)),
                None => println!("No presentation yet"),
            },
            Input::AddChart(n) => {
                let chart = session
                    .conversation
                    .last_reply()
                    .and_then(|m| m.charts.get(n - 1))
                    .cloned();
                match chart {
                    Some(chart) => {
                        let deck = session.deck.add_chart(chart, None);
                        println!("Added slide {} to {}", deck.slides.len(), deck.title);
                    }
                    None => eprintln!("No chart {n} in the last reply"),
                }
            }
            Input::Title(slide, text) => {
                edit(&mut session, &slide, |session, id| {
                    session.deck.update_slide(id, &SlidePatch::title(text.as_str()))
                });
            }
            Input::Notes(slide, text) => {
                edit(&mut session, &slide, |session, id| {
                    session.deck.update_slide(id, &SlidePatch::notes(text.as_str()))
                });
            }
            Input::Delete(slide) => {
                edit(&mut session, &slide, |session, id| session.deck.delete_slide(id));
            }
            Input::Move(slide, direction) => {
                edit(&mut session, &slide, |session, id| {
                    session.deck.move_slide(id, direction)
                });
            }
            Input::Preview => match session.preview(&client).await {
                Ok(preview) => println!("{}", render::preview(&preview)),
                Err(e) => eprintln!("error: {e}"),
            },
            Input::Export(out) => match session.export(&client, &rasterizer).await {
                Ok(exported) => match export::write_export(&exported, out.as_deref(), config) {
                    Ok(path) => println!("Exported {}", path.display()),
                    Err(e) => eprintln!("error: {e:#}"),
                },
                Err(e) => eprintln!("error: {e}"),
            },
            Input::Invalid(reason) => eprintln!("{reason}"),
        }
    }

    Ok(())
}

async fn send(session: &mut Session, client: &ChatClient, text: &str) {
    let result = session
        .send_with(client, text, |event, _| {
            if let Some(line) = render::event_line(event) {
                eprintln!("{line}");
            }
        })
        .await;
    match result {
        Ok(_) => {
            if let Some(reply) = session.conversation.last_reply() {
                println!("{}", render::reply(reply));
            }
        }
        Err(e) => eprintln!("error: {e}"),
    }
}

/// Runs a deck edit against a resolved slide and prints the outcome.
fn edit<F>(session: &mut Session, reference: &str, op: F)
where
    F: FnOnce(&mut Session, &str) -> bool,
{
    let Some(deck) = session.deck.current() else {
        eprintln!("No presentation yet");
        return;
    };
    let Some(id) = resolve_slide(deck, reference) else {
        eprintln!("No slide {reference}");
        return;
    };
    if op(session, &id)
        && let Some(deck) = session.deck.current()
    {
        println!("{}", render::deck(deck));
    }
}

#[cfg(test)]
mod tests {
    use deckchat_core::deck;
    use deckchat_core::models::{ChartDescriptor, ChartKind};

    use super::*;

    #[test]
    fn test_plain_lines_are_messages() {
        assert_eq!(parse_line("  "), Input::Empty);
        assert_eq!(
            parse_line(" Show sales by region "),
            Input::Message("Show sales by region".to_string())
        );
    }

    #[test]
    fn test_commands_parse() {
        assert_eq!(parse_line(":q"), Input::Quit);
        assert_eq!(parse_line(":add 2"), Input::AddChart(2));
        assert_eq!(parse_line(":suggest 1"), Input::Suggest(1));
        assert_eq!(
            parse_line(":title 2 Revenue by quarter"),
            Input::Title("2".to_string(), "Revenue by quarter".to_string())
        );
        assert_eq!(
            parse_line(":notes slide-3"),
            Input::Notes("slide-3".to_string(), String::new())
        );
        assert_eq!(
            parse_line(":up slide-2"),
            Input::Move("slide-2".to_string(), Direction::Up)
        );
        assert_eq!(parse_line(":export"), Input::Export(None));
        assert_eq!(
            parse_line(":export out/q3.pptx"),
            Input::Export(Some(PathBuf::from("out/q3.pptx")))
        );
    }

    #[test]
    fn test_bad_commands_are_reported() {
        assert!(matches!(parse_line(":add zero"), Input::Invalid(_)));
        assert!(matches!(parse_line(":add 0"), Input::Invalid(_)));
        assert!(matches!(parse_line(":del"), Input::Invalid(_)));
        assert!(matches!(parse_line(":title 2"), Input::Invalid(_)));
        assert!(matches!(parse_line(":frobnicate"), Input::Invalid(_)));
    }

    #[test]
    fn test_resolve_slide_by_position_or_id() {
        let chart = ChartDescriptor {
            chart_type: ChartKind::Bar,
            title: "Revenue".to_string(),
            data: Vec::new(),
            x_axis_key: "month".to_string(),
            y_axis_keys: vec!["sales".to_string()],
            colors: Vec::new(),
            config: None,
        };
        let d = deck::create_from_chart(chart.clone(), None);
        let d = deck::append_chart(&d, chart, None);
        let d = deck::move_slide(&d, "slide-2", Direction::Up);

        assert_eq!(resolve_slide(&d, "1").as_deref(), Some("slide-2"));
        assert_eq!(resolve_slide(&d, "slide-1").as_deref(), Some("slide-1"));
        assert_eq!(resolve_slide(&d, "0"), None);
        assert_eq!(resolve_slide(&d, "slide-9"), None);
    }
}
