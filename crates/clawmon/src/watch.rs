use anyhow::Result;
use clawmon_core::Instance;
use clawmon_gateway::{
    InstanceCoordinator, MockGateway, Notification, RefreshScheduler, UnknownInstance,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::render;

/// Line commands accepted on stdin while watching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Next,
    Previous,
    Switch(String),
    Refresh,
    Reconnect,
    Help,
    Quit,
}

impl ControlCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let verb = words.next()?.to_ascii_lowercase();
        let rest = words.collect::<Vec<_>>().join(" ");
        let command = match verb.as_str() {
            "n" | "next" => ControlCommand::Next,
            "p" | "prev" | "previous" => ControlCommand::Previous,
            "s" | "switch" if !rest.is_empty() => ControlCommand::Switch(rest),
            "r" | "refresh" => ControlCommand::Refresh,
            "reconnect" => ControlCommand::Reconnect,
            "h" | "help" | "?" => ControlCommand::Help,
            "q" | "quit" | "exit" => ControlCommand::Quit,
            _ => return None,
        };
        Some(command)
    }
}

const HELP: &str = "commands: next | prev | switch <index|name> | refresh | reconnect | quit";

/// What the watch loop drives: the live coordinator or the simulated gateway.
pub trait Dashboard {
    fn len(&self) -> usize;
    fn current_index(&self) -> usize;
    fn current(&self) -> Option<&Instance>;
    fn instance(&self, index: usize) -> Option<&Instance>;
    fn find(&self, name: &str) -> Option<usize>;
    async fn switch_to(&mut self, index: usize) -> Result<(), UnknownInstance>;
    async fn select_next(&mut self) -> Result<(), UnknownInstance>;
    async fn select_previous(&mut self) -> Result<(), UnknownInstance>;
    fn request_refresh(&mut self);
    async fn reconnect(&mut self);
    async fn next(&mut self) -> Notification;
    async fn shutdown(&mut self);
}

impl Dashboard for InstanceCoordinator {
    fn len(&self) -> usize {
        InstanceCoordinator::len(self)
    }

    fn current_index(&self) -> usize {
        InstanceCoordinator::current_index(self)
    }

    fn current(&self) -> Option<&Instance> {
        InstanceCoordinator::current(self)
    }

    fn instance(&self, index: usize) -> Option<&Instance> {
        self.instances().nth(index)
    }

    fn find(&self, name: &str) -> Option<usize> {
        InstanceCoordinator::find(self, name)
    }

    async fn switch_to(&mut self, index: usize) -> Result<(), UnknownInstance> {
        InstanceCoordinator::switch_to(self, index).await
    }

    async fn select_next(&mut self) -> Result<(), UnknownInstance> {
        InstanceCoordinator::select_next(self).await
    }

    async fn select_previous(&mut self) -> Result<(), UnknownInstance> {
        InstanceCoordinator::select_previous(self).await
    }

    fn request_refresh(&mut self) {
        InstanceCoordinator::request_refresh(self)
    }

    async fn reconnect(&mut self) {
        InstanceCoordinator::reconnect(self).await
    }

    async fn next(&mut self) -> Notification {
        InstanceCoordinator::next(self).await
    }

    async fn shutdown(&mut self) {
        InstanceCoordinator::shutdown(self).await
    }
}

impl Dashboard for MockGateway {
    fn len(&self) -> usize {
        MockGateway::len(self)
    }

    fn current_index(&self) -> usize {
        MockGateway::current_index(self)
    }

    fn current(&self) -> Option<&Instance> {
        MockGateway::current(self)
    }

    fn instance(&self, index: usize) -> Option<&Instance> {
        self.instances().nth(index)
    }

    fn find(&self, name: &str) -> Option<usize> {
        MockGateway::find(self, name)
    }

    async fn switch_to(&mut self, index: usize) -> Result<(), UnknownInstance> {
        MockGateway::switch_to(self, index)
    }

    async fn select_next(&mut self) -> Result<(), UnknownInstance> {
        MockGateway::select_next(self)
    }

    async fn select_previous(&mut self) -> Result<(), UnknownInstance> {
        MockGateway::select_previous(self)
    }

    fn request_refresh(&mut self) {
        MockGateway::request_refresh(self)
    }

    async fn reconnect(&mut self) {
        MockGateway::reconnect(self)
    }

    async fn next(&mut self) -> Notification {
        MockGateway::next(self).await
    }

    async fn shutdown(&mut self) {
        MockGateway::shutdown(self)
    }
}

/// Single-task controller: every input source feeds one select loop, and all view updates
/// happen inside the dashboard between awaits.
pub async fn run<D: Dashboard>(
    mut coordinator: D,
    mut scheduler: RefreshScheduler,
    start: usize,
) -> Result<()> {
    coordinator.switch_to(start).await?;
    print_current(&coordinator);
    println!("{HELP}");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(event = "watch_interrupted");
                break;
            }
            line = stdin.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        stdin_open = false;
                        continue;
                    }
                    Err(err) => {
                        warn!(event = "stdin_read_failed", error = %err);
                        stdin_open = false;
                        continue;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match ControlCommand::parse(&line) {
                    Some(ControlCommand::Quit) => break,
                    Some(command) => {
                        apply(&mut coordinator, &mut scheduler, command).await;
                    }
                    None => println!("unknown command: {}  ({HELP})", line.trim()),
                }
            }
            _ = scheduler.tick() => {
                coordinator.request_refresh();
            }
            notification = coordinator.next() => {
                print_notification(&coordinator, &notification);
            }
        }
    }

    coordinator.shutdown().await;
    Ok(())
}

async fn apply<D: Dashboard>(
    coordinator: &mut D,
    scheduler: &mut RefreshScheduler,
    command: ControlCommand,
) {
    let switched = match command {
        ControlCommand::Next => coordinator.select_next().await,
        ControlCommand::Previous => coordinator.select_previous().await,
        ControlCommand::Switch(target) => {
            let index = target
                .parse::<usize>()
                .ok()
                .filter(|index| *index < coordinator.len())
                .or_else(|| coordinator.find(&target));
            match index {
                Some(index) => coordinator.switch_to(index).await,
                None => {
                    println!("no instance named {target}");
                    return;
                }
            }
        }
        ControlCommand::Refresh => {
            coordinator.request_refresh();
            scheduler.reset();
            return;
        }
        ControlCommand::Reconnect => {
            coordinator.reconnect().await;
            return;
        }
        ControlCommand::Help => {
            println!("{HELP}");
            return;
        }
        ControlCommand::Quit => return,
    };
    match switched {
        Ok(()) => print_current(coordinator),
        Err(err) => println!("{err}"),
    }
}

fn print_current<D: Dashboard>(coordinator: &D) {
    if let Some(instance) = coordinator.current() {
        println!(
            "== {} [{}/{}]",
            instance,
            coordinator.current_index() + 1,
            coordinator.len()
        );
    }
}

fn print_notification<D: Dashboard>(coordinator: &D, notification: &Notification) {
    let index = match notification {
        Notification::StatusFetched { instance, .. }
        | Notification::HealthFetched { instance, .. }
        | Notification::LogArrived { instance, .. }
        | Notification::ConnectionChanged { instance, .. }
        | Notification::FollowEnded { instance } => *instance,
    };
    let name = coordinator
        .instance(index)
        .map(|instance| instance.name.as_str())
        .unwrap_or("?");
    for line in render::notification_lines(name, notification) {
        println!("{line}");
    }
}
