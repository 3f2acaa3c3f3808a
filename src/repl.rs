use log::info;
use std::error::Error;
use std::sync::Arc;
use tokio::io::{ AsyncBufReadExt, BufReader };

use crate::resolver::QueryResolver;
use crate::session::{ format_transcript, CredentialState, Session, SessionError, SessionPolicy };

const HELP: &str = "Commands:\n  \
/key <api-key>  use a completion API key\n  \
/skip           continue without a key (basic responses)\n  \
/quick [n]      list quick questions, or ask question n\n  \
/history        show the conversation so far\n  \
/quit           leave";

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Query(String),
    Key(String),
    Skip,
    Quick(Option<usize>),
    History,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

fn parse_line(line: &str) -> ReplCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return ReplCommand::Query(trimmed.to_string());
    };
    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match name {
        "key" => ReplCommand::Key(rest.to_string()),
        "skip" => ReplCommand::Skip,
        "quick" => ReplCommand::Quick(rest.parse().ok()),
        "history" => ReplCommand::History,
        "help" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        other => ReplCommand::Unknown(other.to_string()),
    }
}

fn credential_banner(session: &Session, notice: &str) -> String {
    match session.state() {
        CredentialState::Prompting => {
            format!("{}\nUse /key <api-key> or /skip. Type /help for commands.", notice)
        }
        CredentialState::Ready if session.has_credential() => {
            "Using your API key for AI responses. Type /help for commands.".to_string()
        }
        CredentialState::Ready => {
            "No API key set. Basic responses are available. Type /help for commands.".to_string()
        }
    }
}

async fn ask(session: &mut Session, resolver: &QueryResolver, query: &str) {
    match session.submit(resolver, query).await {
        Ok(turn) => println!("\n{}\n", turn.text),
        Err(SessionError::CredentialRequired) => {
            println!("{}\nUse /key <api-key> or /skip.", resolver.prompts().credential_notice)
        }
        Err(e) => println!("{}", e),
    }
}

pub async fn run(resolver: Arc<QueryResolver>, policy: SessionPolicy) -> Result<(), Box<dyn Error + Send + Sync>> {
    let prompts = resolver.prompts();
    let mut session = policy.open(&prompts.greeting, None);
    info!("REPL session {} started", session.id());

    println!("{}\n", prompts.greeting);
    println!("{}\n", credential_banner(&session, &prompts.credential_notice));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Query(query) => ask(&mut session, &resolver, &query).await,
            ReplCommand::Key(key) =>
                match session.set_credential(&key) {
                    Ok(()) => println!("API key set. You can now chat with the AI assistant!"),
                    Err(e) => println!("{}", e),
                }
            ReplCommand::Skip => {
                session.skip_credential();
                println!("Continuing without an API key. Basic responses are available.");
            }
            ReplCommand::Quick(None) => {
                for (i, q) in prompts.quick_questions.iter().enumerate() {
                    println!("  {}. {} [{}]", i + 1, q.question, q.category);
                }
            }
            ReplCommand::Quick(Some(n)) => {
                match n.checked_sub(1).and_then(|i| prompts.quick_questions.get(i)) {
                    Some(q) => {
                        let question = q.question.clone();
                        println!("> {}", question);
                        ask(&mut session, &resolver, &question).await;
                    }
                    None => println!("No quick question {}", n),
                }
            }
            ReplCommand::History => print!("{}", format_transcript(session.turns())),
            ReplCommand::Help => println!("{}", HELP),
            ReplCommand::Quit => break,
            ReplCommand::Unknown(name) => println!("Unknown command /{}. Type /help.", name),
        }
    }

    info!("REPL session {} ended after {} turns", session.id(), session.turns().len());
    Ok(())
}
