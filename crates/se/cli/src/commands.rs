//! Command handlers

use std::collections::BTreeMap;
use std::error::Error;
use std::io::{self, BufRead, Write};

use nexum_se::{ChannelHandle, ChannelKind, ReaderHandle, SeService, SessionHandle};
use tracing::{debug, info, warn};

use crate::utils::{format_fci, format_response, parse_hex};

/// List all readers known to the service
pub fn list_command(service: &SeService) -> Result<(), Box<dyn Error>> {
    let readers = service.readers()?;

    if readers.is_empty() {
        println!("No readers found!");
        return Ok(());
    }

    println!("Available readers:");
    for (i, reader) in readers.iter().enumerate() {
        let properties = service.reader_properties(*reader)?;
        let status = if properties.se_present {
            "card present"
        } else {
            "no card"
        };
        let tee = if properties.tee_only { ", TEE only" } else { "" };
        println!("{}. {} ({status}{tee})", i + 1, service.reader_name(*reader)?);
    }

    Ok(())
}

/// Print the ATR of the card in `reader`
pub fn atr_command(service: &SeService, reader: ReaderHandle) -> Result<(), Box<dyn Error>> {
    let session = service.open_session(reader)?;
    let atr = service.atr(session);
    service.close_session(session)?;
    println!("{}", hex::encode_upper(atr?));
    Ok(())
}

/// Open a channel, send every APDU on it and close it again
pub fn transmit_command(
    service: &SeService,
    reader: ReaderHandle,
    aid: Option<&str>,
    basic: bool,
    apdus: &[String],
) -> Result<(), Box<dyn Error>> {
    let commands = apdus
        .iter()
        .map(|apdu| parse_hex(apdu))
        .collect::<Result<Vec<_>, _>>()?;
    let aid = aid.map(parse_hex).transpose()?;
    let kind = if basic {
        ChannelKind::Basic
    } else {
        ChannelKind::Logical
    };

    let session = service.open_session(reader)?;
    let result = (|| -> Result<(), Box<dyn Error>> {
        let channel = service.open_channel(session, kind, aid.as_deref())?;
        info!(
            "Opened {kind} channel {}",
            service.channel_number(channel)?
        );
        if aid.is_some() {
            print_select_response(service, channel);
        }
        for command in &commands {
            let response = service.transmit(channel, command)?;
            println!("> {}", hex::encode_upper(command));
            println!("< {}", format_response(&response));
        }
        Ok(service.close_channel(channel)?)
    })();
    service.close_session(session)?;
    result
}

fn print_select_response(service: &SeService, channel: ChannelHandle) {
    match service.select_response(channel) {
        Ok(response) => {
            println!("Select response: {}", format_response(&response));
            let data = &response[..response.len().saturating_sub(2)];
            if let Some(tree) = format_fci(data) {
                print!("{tree}");
            }
        }
        Err(e) => debug!("No select response: {e}"),
    }
}

/// A line of shell input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// Open a channel, selecting the AID if one is given
    Open {
        kind: ChannelKind,
        aid: Option<Vec<u8>>,
    },
    /// Select the next matching application on a channel
    Next(u8),
    /// Show the select response of a channel
    Fci(u8),
    /// Send an APDU on a channel
    Send(u8, Vec<u8>),
    /// Close a channel
    Close(u8),
    /// List open channels
    Channels,
    /// Print the ATR
    Atr,
    /// Print the command summary
    Help,
    /// Leave the shell
    Quit,
}

const HELP: &str = "\
open [AID]          open a logical channel
basic [AID]         open the basic channel
next CH             select the next matching application
fci CH              show the select response
send CH APDU        transmit a command APDU
close CH            close a channel
channels            list open channels
atr                 print the ATR
quit                close the session and exit";

impl ShellCommand {
    /// Parse one line of input; blank lines yield `None`
    pub fn parse(line: &str) -> Result<Option<Self>, Box<dyn Error>> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();

        let channel = |rest: &[&str]| -> Result<u8, Box<dyn Error>> {
            let number = rest.first().ok_or("Missing channel number")?;
            Ok(number.parse()?)
        };
        let optional_aid = |rest: &[&str]| -> Result<Option<Vec<u8>>, Box<dyn Error>> {
            if rest.is_empty() {
                Ok(None)
            } else {
                Ok(Some(parse_hex(&rest.concat())?))
            }
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "open" => Self::Open {
                kind: ChannelKind::Logical,
                aid: optional_aid(&rest)?,
            },
            "basic" => Self::Open {
                kind: ChannelKind::Basic,
                aid: optional_aid(&rest)?,
            },
            "next" => Self::Next(channel(&rest)?),
            "fci" => Self::Fci(channel(&rest)?),
            "send" => {
                let number = channel(&rest)?;
                if rest.len() < 2 {
                    return Err("Missing command APDU".into());
                }
                Self::Send(number, parse_hex(&rest[1..].concat())?)
            }
            "close" => Self::Close(channel(&rest)?),
            "channels" => Self::Channels,
            "atr" => Self::Atr,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("Unknown command '{other}', try 'help'").into()),
        };
        Ok(Some(command))
    }
}

/// Channels opened from the shell, keyed by channel number
struct Shell<'a> {
    service: &'a SeService,
    session: SessionHandle,
    channels: BTreeMap<u8, ChannelHandle>,
}

impl Shell<'_> {
    fn channel(&self, number: u8) -> Result<ChannelHandle, Box<dyn Error>> {
        self.channels
            .get(&number)
            .copied()
            .ok_or_else(|| format!("Channel {number} is not open").into())
    }

    /// Run one command, returning false when the shell should exit
    fn execute(&mut self, command: ShellCommand) -> Result<bool, Box<dyn Error>> {
        match command {
            ShellCommand::Open { kind, aid } => {
                let channel = self.service.open_channel(self.session, kind, aid.as_deref())?;
                let number = self.service.channel_number(channel)?;
                self.channels.insert(number, channel);
                println!("Opened {kind} channel {number}");
                if aid.is_some() {
                    print_select_response(self.service, channel);
                }
            }
            ShellCommand::Next(number) => {
                let channel = self.channel(number)?;
                self.service.select_next(channel)?;
                print_select_response(self.service, channel);
            }
            ShellCommand::Fci(number) => {
                let response = self.service.select_response(self.channel(number)?)?;
                println!("{}", format_response(&response));
            }
            ShellCommand::Send(number, apdu) => {
                let response = self.service.transmit(self.channel(number)?, &apdu)?;
                println!("{}", format_response(&response));
            }
            ShellCommand::Close(number) => {
                let channel = self.channel(number)?;
                self.channels.remove(&number);
                self.service.close_channel(channel)?;
            }
            ShellCommand::Channels => {
                for (number, channel) in &self.channels {
                    let state = match self.service.select_response(*channel) {
                        Ok(_) => "selected",
                        Err(_) => "no selection",
                    };
                    println!("{number}: {state}");
                }
            }
            ShellCommand::Atr => {
                println!("{}", hex::encode_upper(self.service.atr(self.session)?));
            }
            ShellCommand::Help => println!("{HELP}"),
            ShellCommand::Quit => return Ok(false),
        }
        Ok(true)
    }
}

/// Interactive shell over one session on `reader`
pub fn shell_command(service: &SeService, reader: ReaderHandle) -> Result<(), Box<dyn Error>> {
    let session = service.open_session(reader)?;
    let mut shell = Shell {
        service,
        session,
        channels: BTreeMap::new(),
    };

    println!("Session open on {}, type 'help' for commands", service.reader_name(reader)?);
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("se> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        let command = match ShellCommand::parse(&line?) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        match shell.execute(command) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                warn!("{e}");
                if service.session_is_closed(session)? {
                    println!("Session closed, leaving shell");
                    return Ok(());
                }
            }
        }
    }

    service.close_session(session)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use nexum_se::SeConfig;

    use super::*;
    use crate::utils::reader::{VIRTUAL_ECHO_AID, find_reader_with_card, open_service};

    #[test]
    fn test_parse_commands() {
        assert_eq!(ShellCommand::parse("  ").unwrap(), None);
        assert_eq!(
            ShellCommand::parse("open A000000151 000000").unwrap(),
            Some(ShellCommand::Open {
                kind: ChannelKind::Logical,
                aid: Some(VIRTUAL_ECHO_AID.to_vec()),
            })
        );
        assert_eq!(
            ShellCommand::parse("basic").unwrap(),
            Some(ShellCommand::Open {
                kind: ChannelKind::Basic,
                aid: None,
            })
        );
        assert_eq!(
            ShellCommand::parse("send 2 0001 0000 02 CAFE").unwrap(),
            Some(ShellCommand::Send(2, vec![0x00, 0x01, 0x00, 0x00, 0x02, 0xCA, 0xFE]))
        );
        assert_eq!(ShellCommand::parse("EXIT").unwrap(), Some(ShellCommand::Quit));
        assert!(ShellCommand::parse("send 1").is_err());
        assert!(ShellCommand::parse("close x").is_err());
        assert!(ShellCommand::parse("launch").is_err());
    }

    #[test]
    fn test_shell_session() {
        let service = open_service(true, SeConfig::default()).unwrap();
        let reader = find_reader_with_card(&service).unwrap();
        let mut shell = Shell {
            service: &service,
            session: service.open_session(reader).unwrap(),
            channels: BTreeMap::new(),
        };

        let open = ShellCommand::Open {
            kind: ChannelKind::Logical,
            aid: Some(VIRTUAL_ECHO_AID.to_vec()),
        };
        assert!(shell.execute(open).unwrap());
        assert_eq!(shell.channels.keys().copied().collect::<Vec<_>>(), vec![1]);

        let echo = ShellCommand::Send(1, vec![0x00, 0x01, 0x00, 0x00, 0x02, 0xCA, 0xFE]);
        assert!(shell.execute(echo).unwrap());
        assert!(shell.execute(ShellCommand::Close(1)).unwrap());
        assert!(shell.channels.is_empty());
        assert!(shell.execute(ShellCommand::Fci(1)).is_err());
        assert!(!shell.execute(ShellCommand::Quit).unwrap());
    }

    #[test]
    fn test_transmit_command() {
        let service = open_service(true, SeConfig::default()).unwrap();
        let reader = find_reader_with_card(&service).unwrap();
        let aid = hex::encode(VIRTUAL_ECHO_AID);
        transmit_command(&service, reader, Some(&aid), false, &["0001000002CAFE".into()]).unwrap();
        assert!(transmit_command(&service, reader, None, false, &["zz".into()]).is_err());
    }
}
