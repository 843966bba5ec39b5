//! # Station Console
//!
//! Drives a [`ScanStation`](opname_scan::ScanStation) from stdin. The reader
//! is simulated: commands sent to it are echoed, and its answers are typed
//! in as lines.
//!
//! ```text
//!   operator lines ──► ConsoleLine ──┬──► StationHandle   (scan, pair, save, ...)
//!                                    └──► DeviceCallbacks (tag, code, write ok, ...)
//!
//!   SimulatedReader ──► "reader <- ReadSingleTag" after every line
//! ```

use std::str::FromStr;

use tokio::io::{AsyncBufReadExt, BufReader};

use opname_core::reconciliation::FilterCriteria;
use opname_core::OpnameStatus;
use opname_scan::{
    DeviceCallbacks, LockAction, MemoryBank, ScanPurpose, SimulatedReader, StationHandle,
    StationSnapshot,
};

use crate::error::{CliError, CliResult};

const HELP: &str = "\
Station:  uhf | barcode | scan | clear | status | help | quit
Session:  list | filter [all|found|missing|not_scanned|new|TEXT] | location [NAME|-] | save NAME
Pairing:  search CODE | pair | reset | locktag EPC [BANK] [ACTION]
Reader:   tag EPC [TID] | inv EPC | code CODE | fail [REASON] | stopped | finished
          write ok [EPC] | write fail [REASON] | lock ok | lock fail [REASON] | error MESSAGE";

// =============================================================================
// Line Parsing
// =============================================================================

/// One operator line.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleLine {
    SelectMode { uhf: bool },
    Toggle,
    Clear,
    Status,
    Help,
    Quit,

    List,
    Filter(FilterCriteria),
    Location(Option<String>),
    Save { name: String },

    Search { item_code: String },
    Pair,
    Reset,
    LockTag {
        epc: String,
        bank: MemoryBank,
        action: LockAction,
    },

    TagRead { epc: String, tid: Option<String> },
    InventoryTag { epc: String },
    Barcode { code: String },
    ReadFailed { reason: String },
    Stopped,
    Finished,
    WriteResult {
        success: bool,
        epc: Option<String>,
        error: Option<String>,
    },
    LockResult { success: bool, error: Option<String> },
    DeviceError { message: String },
}

fn required(value: Option<&str>, usage: &str) -> CliResult<String> {
    value
        .map(str::to_string)
        .ok_or_else(|| CliError::validation(format!("usage: {}", usage)))
}

fn parse_outcome(rest: &str, usage: &str) -> CliResult<(bool, Option<String>)> {
    let (word, tail) = rest.split_once(' ').unwrap_or((rest, ""));
    let tail = Some(tail.trim().to_string()).filter(|t| !t.is_empty());
    match word {
        "ok" => Ok((true, tail)),
        "fail" => Ok((false, tail)),
        _ => Err(CliError::validation(format!("usage: {}", usage))),
    }
}

fn parse_filter(rest: &str) -> CliResult<FilterCriteria> {
    match rest {
        "" | "all" => Ok(FilterCriteria::default()),
        "new" => Ok(FilterCriteria::new_only()),
        text => Ok(text
            .parse::<OpnameStatus>()
            .map(FilterCriteria::by_status)
            .unwrap_or_else(|_| FilterCriteria::by_text(text))),
    }
}

impl FromStr for ConsoleLine {
    type Err = CliError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let mut args = rest.split_whitespace();

        let parsed = match word.to_lowercase().as_str() {
            "uhf" => ConsoleLine::SelectMode { uhf: true },
            "barcode" => ConsoleLine::SelectMode { uhf: false },
            "scan" => ConsoleLine::Toggle,
            "clear" => ConsoleLine::Clear,
            "status" => ConsoleLine::Status,
            "help" | "?" => ConsoleLine::Help,
            "quit" | "exit" => ConsoleLine::Quit,

            "list" => ConsoleLine::List,
            "filter" => ConsoleLine::Filter(parse_filter(rest)?),
            "location" => ConsoleLine::Location(
                Some(rest.to_string()).filter(|l| !l.is_empty() && l != "-"),
            ),
            "save" => ConsoleLine::Save {
                name: Some(rest.to_string())
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| CliError::validation("usage: save NAME"))?,
            },

            "search" => ConsoleLine::Search {
                item_code: required(args.next(), "search CODE")?,
            },
            "pair" => ConsoleLine::Pair,
            "reset" => ConsoleLine::Reset,
            "locktag" => ConsoleLine::LockTag {
                epc: required(args.next(), "locktag EPC [BANK] [ACTION]")?,
                bank: args
                    .next()
                    .map(str::parse)
                    .transpose()?
                    .unwrap_or(MemoryBank::Epc),
                action: args
                    .next()
                    .map(str::parse)
                    .transpose()?
                    .unwrap_or(LockAction::Lock),
            },

            "tag" => ConsoleLine::TagRead {
                epc: required(args.next(), "tag EPC [TID]")?,
                tid: args.next().map(str::to_string),
            },
            "inv" => ConsoleLine::InventoryTag {
                epc: required(args.next(), "inv EPC")?,
            },
            "code" => ConsoleLine::Barcode {
                code: required(args.next(), "code CODE")?,
            },
            "fail" => ConsoleLine::ReadFailed {
                reason: Some(rest.to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "no tag in range".to_string()),
            },
            "stopped" => ConsoleLine::Stopped,
            "finished" => ConsoleLine::Finished,
            "write" => {
                let (success, tail) = parse_outcome(rest, "write ok [EPC] | write fail [REASON]")?;
                if success {
                    ConsoleLine::WriteResult {
                        success,
                        epc: tail,
                        error: None,
                    }
                } else {
                    ConsoleLine::WriteResult {
                        success,
                        epc: None,
                        error: tail,
                    }
                }
            }
            "lock" => {
                let (success, error) = parse_outcome(rest, "lock ok | lock fail [REASON]")?;
                ConsoleLine::LockResult { success, error }
            }
            "error" => ConsoleLine::DeviceError {
                message: required(Some(rest).filter(|r| !r.is_empty()), "error MESSAGE")?,
            },

            other => {
                return Err(CliError::validation(format!(
                    "unknown command '{}' (type 'help')",
                    other
                )))
            }
        };
        Ok(parsed)
    }
}

// =============================================================================
// Console
// =============================================================================

/// Interactive front-end of one station.
pub struct Console {
    handle: StationHandle,
    callbacks: DeviceCallbacks,
    reader: SimulatedReader,
    purpose: ScanPurpose,
    json: bool,
    last_shown: Option<(String, Option<String>)>,
}

impl Console {
    pub fn new(
        handle: StationHandle,
        callbacks: DeviceCallbacks,
        reader: SimulatedReader,
        purpose: ScanPurpose,
        json: bool,
    ) -> Self {
        Console {
            handle,
            callbacks,
            reader,
            purpose,
            json,
            last_shown: None,
        }
    }

    /// Reads lines until `quit`, end of input or Ctrl+C, then stops the
    /// station.
    pub async fn run(mut self) -> CliResult<()> {
        println!("{}", HELP);
        self.show_status(true).await?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }

            let outcome = match line.parse::<ConsoleLine>() {
                Ok(ConsoleLine::Quit) => break,
                Ok(command) => self.execute(command).await,
                Err(e) => {
                    println!("{}", e.message);
                    continue;
                }
            };

            self.echo_reader_commands();
            let failed = outcome.is_err();
            let shown = self.show_status(failed).await?;
            if let Err(e) = outcome {
                // Station failures already appear as the status line
                if shown.as_deref() != Some(e.message.as_str()) {
                    println!("error: {}", e.message);
                }
            }
        }

        self.handle.shutdown().await?;
        Ok(())
    }

    async fn execute(&self, command: ConsoleLine) -> CliResult<()> {
        let handle = &self.handle;
        let callbacks = &self.callbacks;

        match command {
            ConsoleLine::SelectMode { uhf } => {
                handle.select_mode(uhf).await?;
            }
            ConsoleLine::Toggle => {
                handle.toggle_scan(self.purpose).await?;
            }
            ConsoleLine::Clear => handle.clear_scan().await?,
            ConsoleLine::Status => self.print_snapshot(&handle.latest())?,
            ConsoleLine::Help => println!("{}", HELP),
            ConsoleLine::Quit => {}

            ConsoleLine::List => {
                let items = handle.filtered_items().await?;
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&items)?);
                } else {
                    for item in &items {
                        println!(
                            "{:<14} {:<12} {:<40} {}",
                            item.item_code.as_deref().unwrap_or("-"),
                            format!("{:?}", item.status),
                            item.title,
                            item.expected_location.as_deref().unwrap_or("-"),
                        );
                    }
                    println!("{} item(s)", items.len());
                }
            }
            ConsoleLine::Filter(criteria) => handle.set_filter(criteria).await?,
            ConsoleLine::Location(location) => handle.set_location(location).await?,
            ConsoleLine::Save { name } => {
                let report = handle.finalize_session(name).await?;
                println!("Report {} saved", report.id);
            }

            ConsoleLine::Search { item_code } => {
                handle.search_item(item_code).await?;
            }
            ConsoleLine::Pair => {
                let request = handle.start_pairing().await?;
                println!("Writing EPC {}", request.new_epc_hex);
            }
            ConsoleLine::Reset => handle.reset_pairing().await?,
            ConsoleLine::LockTag { epc, bank, action } => {
                handle.lock_tag(epc, bank, action).await?
            }

            ConsoleLine::TagRead { epc, tid } => callbacks.on_single_tag_read(epc, tid),
            ConsoleLine::InventoryTag { epc } => callbacks.on_uhf_tag_scanned(epc),
            ConsoleLine::Barcode { code } => callbacks.on_barcode_scanned(code),
            ConsoleLine::ReadFailed { reason } => callbacks.on_single_tag_read_failed(reason),
            ConsoleLine::Stopped => callbacks.on_operation_stopped(),
            ConsoleLine::Finished => callbacks.on_inventory_finished(),
            ConsoleLine::WriteResult {
                success,
                epc,
                error,
            } => callbacks.on_write_result(success, epc, error),
            ConsoleLine::LockResult { success, error } => callbacks.on_lock_result(success, error),
            ConsoleLine::DeviceError { message } => callbacks.on_device_error(message),
        }
        Ok(())
    }

    fn echo_reader_commands(&self) {
        for command in self.reader.take_commands() {
            println!("reader <- {:?}", command);
        }
    }

    /// Prints the status line when it changed since the last line, or when
    /// `force` is set. Returns the station error currently reported.
    async fn show_status(&mut self, force: bool) -> CliResult<Option<String>> {
        let snapshot = self.handle.snapshot().await?;
        let shown = (snapshot.status_message.clone(), snapshot.last_error.clone());
        if !force && self.last_shown.as_ref() == Some(&shown) {
            return Ok(shown.1);
        }

        match &shown.1 {
            Some(error) => println!("! {}", error),
            None => println!("> {}", shown.0),
        }
        if let Some(session) = &snapshot.session {
            let c = session.counts;
            println!(
                "  found {}/{} ({}%), missing {}, new {}",
                c.found,
                c.expected,
                c.progress_percent(),
                c.missing,
                c.new
            );
        }
        let error = shown.1.clone();
        self.last_shown = Some(shown);
        Ok(error)
    }

    fn print_snapshot(&self, snapshot: &StationSnapshot) -> CliResult<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(snapshot)?);
            return Ok(());
        }

        let coordinator = &snapshot.coordinator;
        println!("Device:   {}", snapshot.device_id);
        println!(
            "Mode:     {} (active: {})",
            coordinator.selected_mode,
            coordinator
                .active_mode
                .map(|m| m.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        if let Some(operation) = coordinator.device_operation {
            println!("Busy:     {}", operation);
        }
        if let Some(session) = &snapshot.session {
            println!(
                "Session:  {} at {}{}",
                session.session_id,
                session.location.as_deref().unwrap_or("(no location)"),
                if session.closed { " [closed]" } else { "" }
            );
        }
        println!("Pairing:  {:?} - {}", snapshot.pairing.state, snapshot.pairing.message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ConsoleLine {
        line.parse().unwrap()
    }

    #[test]
    fn test_parse_reader_answers() {
        assert_eq!(
            parse("tag e200 ABCD"),
            ConsoleLine::TagRead {
                epc: "e200".to_string(),
                tid: Some("ABCD".to_string())
            }
        );
        assert_eq!(
            parse("write fail tag moved away"),
            ConsoleLine::WriteResult {
                success: false,
                epc: None,
                error: Some("tag moved away".to_string())
            }
        );
        assert_eq!(
            parse("write ok"),
            ConsoleLine::WriteResult {
                success: true,
                epc: None,
                error: None
            }
        );
        assert_eq!(
            parse("fail"),
            ConsoleLine::ReadFailed {
                reason: "no tag in range".to_string()
            }
        );
    }

    #[test]
    fn test_parse_session_lines() {
        assert_eq!(parse("filter"), ConsoleLine::Filter(FilterCriteria::default()));
        assert_eq!(parse("filter new"), ConsoleLine::Filter(FilterCriteria::new_only()));
        assert_eq!(
            parse("filter found"),
            ConsoleLine::Filter(FilterCriteria::by_status(OpnameStatus::Found))
        );
        assert_eq!(
            parse("filter jane eyre"),
            ConsoleLine::Filter(FilterCriteria::by_text("jane eyre"))
        );
        assert_eq!(parse("location -"), ConsoleLine::Location(None));
        assert_eq!(
            parse("save End of term"),
            ConsoleLine::Save {
                name: "End of term".to_string()
            }
        );
    }

    #[test]
    fn test_parse_locktag_defaults() {
        assert_eq!(
            parse("locktag 4131"),
            ConsoleLine::LockTag {
                epc: "4131".to_string(),
                bank: MemoryBank::Epc,
                action: LockAction::Lock
            }
        );
        assert!("locktag 4131 nowhere".parse::<ConsoleLine>().is_err());
    }

    #[test]
    fn test_parse_rejects_incomplete_lines() {
        assert!("tag".parse::<ConsoleLine>().is_err());
        assert!("save".parse::<ConsoleLine>().is_err());
        assert!("write maybe".parse::<ConsoleLine>().is_err());
        assert!("dance".parse::<ConsoleLine>().is_err());
    }
}
