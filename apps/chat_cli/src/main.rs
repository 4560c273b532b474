mod config;
mod render;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use client_core::{ConversationSynchronizer, HttpTransport, SyncEvent, TungsteniteConnector};
use shared::domain::{ConversationRef, GroupId, Membership};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::render::Transcript;

#[derive(Parser, Debug)]
struct Args {
    /// REST origin of the chat backend; the live feed uses the same host.
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    token: Option<String>,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    password: Option<String>,
}

const HELP: &str = "commands: /group <id>, /dm <username>, /join, /groups, /members, /leave, /quit";

enum Input {
    Line(Option<String>),
    Sync(SyncEvent),
}

fn print_all(transcript: &mut Transcript, sync: &ConversationSynchronizer) {
    for line in transcript.render_all(sync.messages(), Utc::now()) {
        println!("{line}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(api_url) = args.api_url {
        settings.api_url = api_url;
    }
    if let Some(token) = args.token {
        settings.access_token = Some(token);
    }
    if let Some(username) = args.username {
        settings.username = Some(username);
    }

    let mut transport = HttpTransport::new(&settings.api_url, "")
        .with_context(|| format!("invalid api url '{}'", settings.api_url))?;
    match (settings.access_token, settings.username, args.password) {
        (Some(token), _, _) => transport.set_token(token),
        (None, Some(username), Some(password)) => {
            let token = transport
                .login(&username, &password)
                .await
                .map_err(|err| anyhow::anyhow!(err.display_message("Login failed")))?;
            transport.set_token(token.access_token);
        }
        _ => bail!("no access token configured; pass --token or --username and --password"),
    }

    let me = transport
        .me()
        .await
        .map_err(|err| anyhow::anyhow!(err.display_message("Unauthorized")))?;
    info!(user_id = me.id.0, api_url = %transport.base_url(), "signed in");
    println!("Signed in as {}. {HELP}", me.username);

    let mut sync = ConversationSynchronizer::new(
        Arc::new(transport.clone()),
        Arc::new(TungsteniteConnector),
    );
    let mut transcript = Transcript::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line.context("failed to read stdin")?),
            event = sync.next_event() => Input::Sync(event),
        };

        match input {
            Input::Line(None) => break,
            Input::Line(Some(line)) => {
                if !handle_line(line.trim(), &transport, &mut sync, &mut transcript).await {
                    break;
                }
            }
            Input::Sync(event) => render_event(event, &sync, &mut transcript),
        }
    }

    sync.clear_selection();
    Ok(())
}

fn render_event(event: SyncEvent, sync: &ConversationSynchronizer, transcript: &mut Transcript) {
    match event {
        SyncEvent::HistoryLoaded { .. } => print_all(transcript, sync),
        SyncEvent::MessageAppended { message_id, .. } | SyncEvent::MessageSent { message_id, .. } => {
            if let Some(line) = transcript.render_one(sync.messages(), message_id, Utc::now()) {
                println!("{line}");
            }
        }
        SyncEvent::Error { message, .. } => eprintln!("error: {message}"),
    }
}

/// Returns `false` when the session should end.
async fn handle_line(
    line: &str,
    transport: &HttpTransport,
    sync: &mut ConversationSynchronizer,
    transcript: &mut Transcript,
) -> bool {
    if line.is_empty() {
        return true;
    }
    let (command, argument) = match line.split_once(' ') {
        Some((command, argument)) => (command, argument.trim()),
        None => (line, ""),
    };

    match command {
        "/quit" => return false,
        "/help" => println!("{HELP}"),
        "/group" => match argument.parse::<i64>() {
            Ok(group_id) => open_group(GroupId(group_id), transport, sync, transcript).await,
            Err(_) => println!("usage: /group <id>"),
        },
        "/dm" if !argument.is_empty() => {
            sync.select_direct(argument);
            println!("-- direct messages with {argument} --");
            print_all(transcript, sync);
        }
        "/dm" => println!("usage: /dm <username>"),
        "/join" => join_active_group(transport, sync, transcript).await,
        "/groups" => match transport.list_all_groups().await {
            Ok(groups) => {
                for group in groups {
                    let marker = if group.is_member == Some(true) { "*" } else { " " };
                    println!("{marker} {:>4}  {}", group.id.0, group.name);
                }
            }
            Err(err) => eprintln!("error: {}", err.display_message("Failed to load groups")),
        },
        "/members" => {
            let Some(group_id) = sync.active_conversation().and_then(ConversationRef::group_id)
            else {
                println!("select a group first");
                return true;
            };
            match transport.list_members(group_id).await {
                Ok(members) => {
                    for member in members {
                        let banned = if member.is_banned { " (banned)" } else { "" };
                        println!("{} [{}]{banned}", member.username, member.role);
                    }
                }
                Err(err) => eprintln!("error: {}", err.display_message("Failed to load members")),
            }
        }
        "/leave" => {
            sync.clear_selection();
            transcript.reset();
        }
        command if command.starts_with('/') => println!("unknown command. {HELP}"),
        _ => {
            sync.set_compose_text(line);
            if !sync.compose_and_send() {
                match sync.membership() {
                    None => println!("select a conversation first"),
                    Some(Membership::NotMember) => println!("join the group to send messages"),
                    Some(_) => println!("still checking group membership"),
                }
            }
        }
    }
    true
}

async fn open_group(
    group_id: GroupId,
    transport: &HttpTransport,
    sync: &mut ConversationSynchronizer,
    transcript: &mut Transcript,
) {
    sync.select_conversation(ConversationRef::Group(group_id));
    println!("-- group {group_id} --");
    transcript.reset();

    let membership = match transport.list_all_groups().await {
        Ok(groups) => groups
            .iter()
            .find(|group| group.id == group_id)
            .map(|group| Membership::from_flag(group.is_member))
            .unwrap_or(Membership::NotMember),
        Err(err) => {
            eprintln!("error: {}", err.display_message("Failed to load groups"));
            return;
        }
    };
    sync.resolve_membership(group_id, membership);
    print_all(transcript, sync);
    if membership == Membership::NotMember {
        println!("you are not a member of this group; /join to join");
    }
}

async fn join_active_group(
    transport: &HttpTransport,
    sync: &mut ConversationSynchronizer,
    transcript: &mut Transcript,
) {
    let Some(group_id) = sync.active_conversation().and_then(ConversationRef::group_id) else {
        println!("select a group first");
        return;
    };
    match transport.join_group(group_id).await {
        Ok(response) if response.joined => {
            sync.resolve_membership(group_id, Membership::Member);
            println!("joined group {group_id}");
            print_all(transcript, sync);
        }
        Ok(_) => println!("could not join group {group_id}"),
        Err(err) => eprintln!("error: {}", err.display_message("Failed to join group")),
    }
}
