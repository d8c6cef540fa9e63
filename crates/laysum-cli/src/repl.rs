//! Line-oriented annotation loop.
//!
//! Parsing and applying commands are plain functions over the session;
//! only [`Repl::run`] touches stdin and the store.

use std::io::Write as _;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use laysum_core::{AnnotationRecord, AnnotationSession, Aspect, LabelCategory};
use laysum_store::{AnnotationStore, StoreError};

use crate::display;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Next,
    Previous,
    First,
    Last,
    /// Zero-based item index.
    Goto(usize),
    Select { start: usize, end: usize },
    Find(String),
    Correct(Option<String>),
    Label(LabelCategory),
    Cancel,
    /// Zero-based label index.
    Delete(usize),
    Rate(Aspect, u8),
    Show,
    Labels,
    Categories,
    Submit,
    Help,
    Quit,
}

/// What the loop should do after a command was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Nothing,
    Navigated,
    Edited,
    ShowSummary,
    ShowCard,
    ShowLabels,
    ShowCategories,
    Help,
    Message(String),
    Submit(AnnotationRecord),
    Quit,
}

/// Parse one input line. Blank lines parse to `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(word, rest)| (word, rest.trim()));

    let command = match word.to_ascii_lowercase().as_str() {
        "next" | "n" => Command::Next,
        "prev" | "previous" | "p" => Command::Previous,
        "first" => Command::First,
        "last" => Command::Last,
        "goto" | "g" => Command::Goto(one_based(rest, "goto <n>")?),
        "select" | "s" => {
            let mut parts = rest.split_whitespace();
            let usage = "select <start> <end>";
            let start = number(parts.next(), usage)?;
            let end = number(parts.next(), usage)?;
            if parts.next().is_some() {
                bail!("usage: {usage}");
            }
            Command::Select { start, end }
        }
        "find" | "f" => {
            if rest.is_empty() {
                bail!("usage: find <text>");
            }
            Command::Find(unquote(rest).to_string())
        }
        "correct" | "c" => match unquote(rest) {
            "" => Command::Correct(None),
            text => Command::Correct(Some(text.to_string())),
        },
        "label" | "l" => {
            if rest.is_empty() {
                bail!("usage: label <category> (see 'categories')");
            }
            Command::Label(rest.parse()?)
        }
        "cancel" => Command::Cancel,
        "delete" | "d" => Command::Delete(one_based(rest, "delete <n>")?),
        "rate" | "r" => {
            let usage = "rate <aspect> <0-5>";
            let mut parts = rest.split_whitespace();
            let aspect: Aspect = parts
                .next()
                .with_context(|| format!("usage: {usage}"))?
                .parse()?;
            let value = parts
                .next()
                .with_context(|| format!("usage: {usage}"))?
                .parse::<u8>()
                .with_context(|| format!("usage: {usage}"))?;
            Command::Rate(aspect, value)
        }
        "show" => Command::Show,
        "labels" => Command::Labels,
        "categories" => Command::Categories,
        "submit" => Command::Submit,
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        other => bail!("unknown command '{other}', type 'help' for a list"),
    };
    Ok(Some(command))
}

fn number(token: Option<&str>, usage: &str) -> Result<usize> {
    token
        .and_then(|t| t.parse().ok())
        .with_context(|| format!("usage: {usage}"))
}

fn one_based(token: &str, usage: &str) -> Result<usize> {
    let n = number(Some(token), usage)?;
    n.checked_sub(1).context("numbering starts at 1")
}

fn unquote(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}

/// Apply a command to the session. Errors leave the session unchanged.
pub fn apply(session: &mut AnnotationSession, command: Command) -> Result<Effect> {
    let moved = |changed: bool| {
        if changed {
            Effect::Navigated
        } else {
            Effect::Nothing
        }
    };
    let effect = match command {
        Command::Next => moved(session.next()),
        Command::Previous => moved(session.previous()),
        Command::First => moved(session.first()),
        Command::Last => moved(session.last()),
        Command::Goto(index) => moved(session.goto(index)),
        Command::Select { start, end } => {
            session.select_range(start, end)?;
            Effect::ShowSummary
        }
        Command::Find(text) => {
            let start = session
                .current_document()
                .and_then(|doc| doc.text().find(&text))
                .with_context(|| format!("\"{text}\" does not occur in the summary"))?;
            session.select_range(start, start + text.len())?;
            Effect::ShowSummary
        }
        Command::Correct(text) => {
            session.set_correction(text)?;
            Effect::ShowSummary
        }
        Command::Label(category) => {
            session.confirm(category)?;
            Effect::Edited
        }
        Command::Cancel => {
            session.cancel_selection();
            Effect::ShowSummary
        }
        Command::Delete(index) => match session.delete_label(index) {
            Some(_) => Effect::Edited,
            None => Effect::Message(format!("There is no label {}.", index + 1)),
        },
        Command::Rate(aspect, value) => {
            session.rate(aspect, value)?;
            Effect::Edited
        }
        Command::Show => Effect::ShowCard,
        Command::Labels => Effect::ShowLabels,
        Command::Categories => Effect::ShowCategories,
        Command::Submit => Effect::Submit(session.submission()?),
        Command::Help => Effect::Help,
        Command::Quit => Effect::Quit,
    };
    Ok(effect)
}

pub struct Repl<'a> {
    store: &'a dyn AnnotationStore,
    user: &'a str,
    session: AnnotationSession,
    color: bool,
}

impl<'a> Repl<'a> {
    pub fn new(
        store: &'a dyn AnnotationStore,
        user: &'a str,
        session: AnnotationSession,
        color: bool,
    ) -> Self {
        Self {
            store,
            user,
            session,
            color,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        self.load_current().await;
        self.print_card();
        println!("Type 'help' for commands.");

        loop {
            print!("laysum> ");
            std::io::stdout().flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let effect = match parse_command(&line) {
                Ok(None) => continue,
                Ok(Some(command)) => apply(&mut self.session, command),
                Err(e) => Err(e),
            };
            let effect = match effect {
                Ok(effect) => effect,
                Err(e) => {
                    println!("{e}");
                    continue;
                }
            };

            match effect {
                Effect::Quit => break,
                Effect::Nothing => {}
                Effect::Navigated => {
                    self.load_current().await;
                    self.print_card();
                }
                Effect::Edited => {
                    self.autosave().await;
                    self.print_summary();
                }
                Effect::ShowSummary => self.print_summary(),
                Effect::ShowCard => self.print_card(),
                Effect::ShowLabels => {
                    if let (Some(annotation), Some(document)) = (
                        self.session.current_annotation(),
                        self.session.current_document(),
                    ) {
                        print!("{}", display::format_labels(&annotation.labels, document));
                    }
                }
                Effect::ShowCategories => print!("{}", display::format_categories()),
                Effect::Help => print!("{}", display::HELP),
                Effect::Message(message) => println!("{message}"),
                Effect::Submit(record) => self.save(record, true).await,
            }
        }
        Ok(())
    }

    async fn load_current(&mut self) {
        let Some(id) = self.session.current_needs_load().map(str::to_string) else {
            return;
        };
        match self.store.load_annotation(self.user, &id).await {
            Ok(record) => self.session.apply_loaded(&id, record),
            Err(e) => {
                warn!(document_id = %id, error = %e, "could not load saved annotation");
                println!("Could not load the saved annotation: {e}");
            }
        }
    }

    async fn autosave(&mut self) {
        if let Some(record) = self.session.take_autosave() {
            self.save(record, false).await;
        }
    }

    /// Persist and report. Successful autosaves stay quiet, and so do
    /// autosaves a store declines until every aspect is rated.
    async fn save(&mut self, record: AnnotationRecord, announce: bool) {
        let result = self.store.save_annotation(self.user, &record).await;
        if !announce && let Err(StoreError::Incomplete(_)) = &result {
            self.session.defer_save(&record.document_id);
            return;
        }
        let result = result.map_err(|e| e.to_string());
        let failed = result.is_err();
        self.session.record_save_result(&record.document_id, result);
        if let Some(notice) = self.session.take_notice()
            && (announce || failed)
        {
            println!("{notice}");
        }
    }

    fn print_summary(&mut self) {
        let color = self.color;
        let Some(document) = self.session.current_document().cloned() else {
            return;
        };
        println!(
            "{}",
            display::format_segments(&document, self.session.segments(), color)
        );
        if let Some(pending) = self.session.pending() {
            println!(
                "Selected {}..{} \"{}\"; 'label <category>' to confirm.",
                pending.start, pending.end, pending.original_text
            );
        }
    }

    fn print_card(&mut self) {
        let segments = self.session.segments().to_vec();
        let (Some(item), Some(annotation), Some(document)) = (
            self.session.current_item(),
            self.session.current_annotation(),
            self.session.current_document(),
        ) else {
            println!("No summaries.");
            return;
        };
        print!(
            "{}",
            display::format_card(
                self.session.current_index(),
                self.session.len(),
                item,
                annotation,
                document,
                &segments,
                self.color,
            )
        );
        println!(
            "{}",
            display::format_nav(
                &self.session.page_numbers(),
                self.session.current_index(),
                self.session.progress(),
            )
        );
    }
}
