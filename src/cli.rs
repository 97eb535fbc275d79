use std::net;

use clap::{Arg, ArgMatches, Command};
use rustyline::{
    Completer, CompletionType, Config, Editor, Helper, Highlighter, Hinter, Validator,
};
use tokio::sync::{mpsc, oneshot};

use ospf_lib::neighbor::status::Status;
use ospf_lib::router::event::{Event, ShowKind};

lazy_static::lazy_static! {
    static ref LSA_COMMAND : Command = Command::new("lsa")
    .about("Feed one hex encoded lsa as if received from a neighbor")
    .arg(Arg::new("ifindex").help("Interface index").required(true))
    .arg(Arg::new("neighbor").help("Neighbor router id").required(true))
    .arg(Arg::new("hex").help("Encoded lsa").required(true));
    static ref UPDATE_COMMAND : Command = Command::new("update")
    .about("Feed a hex encoded link state update packet")
    .arg(Arg::new("ifindex").help("Interface index").required(true))
    .arg(Arg::new("neighbor").help("Neighbor router id").required(true))
    .arg(Arg::new("hex").help("Encoded packet").required(true));
    static ref ACK_COMMAND : Command = Command::new("ack")
    .about("Acknowledge hex encoded lsa headers on behalf of a neighbor")
    .arg(Arg::new("ifindex").help("Interface index").required(true))
    .arg(Arg::new("neighbor").help("Neighbor router id").required(true))
    .arg(Arg::new("hex").help("Concatenated lsa headers").required(true));
    static ref NEIGHBOR_COMMAND : Command = Command::new("neighbor")
    .about("Report a neighbor state change")
    .arg(Arg::new("ifindex").help("Interface index").required(true))
    .arg(Arg::new("neighbor").help("Neighbor router id").required(true))
    .arg(Arg::new("addr").help("Neighbor interface address").required(true))
    .arg(Arg::new("state").help("down, init, 2way, exstart, exchange, loading or full").required(true));
    static ref INTERFACE_UP_COMMAND : Command = Command::new("up")
    .about("Interface up")
    .arg(Arg::new("ifindex").help("Interface index").required(true));
    static ref INTERFACE_DOWN_COMMAND : Command = Command::new("down")
    .about("Interface down")
    .arg(Arg::new("ifindex").help("Interface index").required(true));
    static ref INTERFACE_COMMAND : Command = Command::new("interface")
    .about("Interface commands")
    .subcommand(INTERFACE_UP_COMMAND.clone())
    .subcommand(INTERFACE_DOWN_COMMAND.clone());
    static ref SHOW_COMMAND : Command = Command::new("show")
    .about("Show router state")
    .arg(Arg::new("what").help("lsdb, routes, overlay or timers").required(true));
    static ref EXIT_COMMAND : Command = Command::new("exit")
    .about("Flush own lsas and exit");
    static ref OSPF_COMMAND : Command = Command::new("ospf")
    .version("1.0")
    .about("Overlay OSPF CLI")
    .no_binary_name(true)
    .subcommand(LSA_COMMAND.clone())
    .subcommand(UPDATE_COMMAND.clone())
    .subcommand(ACK_COMMAND.clone())
    .subcommand(NEIGHBOR_COMMAND.clone())
    .subcommand(INTERFACE_COMMAND.clone())
    .subcommand(SHOW_COMMAND.clone())
    .subcommand(EXIT_COMMAND.clone());
}

#[derive(Helper, Hinter, Validator, Highlighter, Completer)]
struct OspfHelper;

#[derive(Debug)]
enum Request {
    Event(Event),
    Show(ShowKind),
    Exit,
    Help,
}

fn arg<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<T, String> {
    let raw = matches
        .get_one::<String>(name)
        .ok_or_else(|| format!("missing {}", name))?;
    raw.parse::<T>()
        .map_err(|_| format!("invalid {} '{}'", name, raw))
}

fn hex_arg(matches: &ArgMatches) -> Result<Vec<u8>, String> {
    let raw = matches
        .get_one::<String>("hex")
        .ok_or_else(|| "missing hex".to_string())?;
    hex::decode(raw).map_err(|err| format!("invalid hex: {}", err))
}

fn match_ospf_command(matches: &ArgMatches) -> Result<Request, String> {
    match matches.subcommand() {
        Some(("lsa", sub)) => Ok(Request::Event(Event::LsaReceived {
            ifindex: arg(sub, "ifindex")?,
            neighbor: arg(sub, "neighbor")?,
            data: hex_arg(sub)?,
        })),
        Some(("update", sub)) => Ok(Request::Event(Event::UpdateReceived {
            ifindex: arg(sub, "ifindex")?,
            neighbor: arg(sub, "neighbor")?,
            packet: hex_arg(sub)?,
        })),
        Some(("ack", sub)) => Ok(Request::Event(Event::AckReceived {
            ifindex: arg(sub, "ifindex")?,
            neighbor: arg(sub, "neighbor")?,
            headers: hex_arg(sub)?,
        })),
        Some(("neighbor", sub)) => Ok(Request::Event(Event::NeighborChange {
            ifindex: arg(sub, "ifindex")?,
            neighbor: arg::<net::Ipv4Addr>(sub, "neighbor")?,
            addr: arg(sub, "addr")?,
            state: arg::<Status>(sub, "state")?,
        })),
        Some(("interface", sub)) => match sub.subcommand() {
            Some(("up", args)) => Ok(Request::Event(Event::InterfaceChange {
                ifindex: arg(args, "ifindex")?,
                up: true,
            })),
            Some(("down", args)) => Ok(Request::Event(Event::InterfaceChange {
                ifindex: arg(args, "ifindex")?,
                up: false,
            })),
            _ => Ok(Request::Help),
        },
        Some(("show", sub)) => Ok(Request::Show(arg(sub, "what")?)),
        Some(("exit", _)) => Ok(Request::Exit),
        _ => Ok(Request::Help),
    }
}

fn parse_line(line: &str) -> Result<Request, String> {
    let matches = OSPF_COMMAND
        .clone()
        .try_get_matches_from(line.split_whitespace())
        .map_err(|err| err.to_string())?;
    match_ospf_command(&matches)
}

/// Blocking read-eval loop. Runs on its own thread and talks to the router
/// only through `events`.
pub fn cli(events: mpsc::Sender<Event>, prompt: String) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cmdline_config = Config::builder()
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .build();
    let mut cmdline_editor = Editor::<OspfHelper, _>::with_config(cmdline_config)?;
    cmdline_editor.set_helper(Some(OspfHelper));
    loop {
        let line = match cmdline_editor.readline(&format!("{}>>", prompt)) {
            Ok(line) => line,
            Err(_) => {
                events.blocking_send(Event::Shutdown)?;
                return Ok(());
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        cmdline_editor.add_history_entry(line.as_str())?;
        match parse_line(&line) {
            Ok(Request::Event(event)) => events.blocking_send(event)?,
            Ok(Request::Show(kind)) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                events.blocking_send(Event::Show(kind, reply_tx))?;
                match reply_rx.blocking_recv() {
                    Ok(text) => println!("{}", text),
                    Err(_) => return Ok(()),
                }
            }
            Ok(Request::Exit) => {
                println!("Bye");
                events.blocking_send(Event::Shutdown)?;
                return Ok(());
            }
            Ok(Request::Help) => {
                OSPF_COMMAND.clone().print_help()?;
            }
            Err(err) => ospf_lib::util::error(&err),
        }
    }
}
