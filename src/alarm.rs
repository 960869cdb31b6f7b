// src/alarm.rs
//! Alarm sinks the monitor rings when the destination is reached

use crossterm::{
    execute,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
};
use std::{io, sync::Arc, time::Duration};
use tokio::{sync::Notify, time::sleep};

/// Receiver of alarm start/stop requests.
///
/// Both calls must be idempotent: starting a ringing alarm or stopping a
/// silent one does nothing.
pub trait AlarmSink {
    fn start(&mut self);
    fn stop(&mut self);
}

impl<A: AlarmSink + ?Sized> AlarmSink for Box<A> {
    fn start(&mut self) {
        (**self).start()
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

/// Rings the terminal bell with a banner, and optionally loops an external
/// player command, until stopped.
pub struct TerminalAlarm {
    bell: bool,
    command: Option<Vec<String>>,
    ringing: Option<Arc<Notify>>,
}

impl TerminalAlarm {
    pub fn new(bell: bool, command: Option<Vec<String>>) -> Self {
        Self {
            bell,
            command: command.filter(|c| !c.is_empty()),
            ringing: None,
        }
    }

    pub fn is_ringing(&self) -> bool {
        self.ringing.is_some()
    }
}

impl AlarmSink for TerminalAlarm {
    /// Must be called from within a tokio runtime.
    fn start(&mut self) {
        if self.ringing.is_some() {
            return;
        }

        let stop = Arc::new(Notify::new());
        tokio::spawn(ring(self.bell, self.command.clone(), Arc::clone(&stop)));
        self.ringing = Some(stop);
        tracing::info!("Alarm started");
    }

    fn stop(&mut self) {
        if let Some(stop) = self.ringing.take() {
            // notify_one stores a permit, so a ring loop that is between
            // waits still sees it
            stop.notify_one();
            tracing::info!("Alarm stopped");
        }
    }
}

impl Drop for TerminalAlarm {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn ring(bell: bool, command: Option<Vec<String>>, stop: Arc<Notify>) {
    loop {
        if let Err(e) = announce(&mut io::stderr(), bell) {
            tracing::warn!("Failed to write alarm banner: {}", e);
        }

        let pause = async {
            match &command {
                Some(cmd) => play(cmd).await,
                None => sleep(Duration::from_secs(1)).await,
            }
        };

        tokio::select! {
            _ = stop.notified() => break,
            _ = pause => {}
        }
    }
}

fn announce(out: &mut impl io::Write, bell: bool) -> io::Result<()> {
    if bell {
        execute!(out, Print("\x07"))?;
    }
    execute!(
        out,
        SetForegroundColor(Color::Red),
        SetAttribute(Attribute::Bold),
        Print("*** WAKE UP: you are close to your destination ***\n"),
        SetAttribute(Attribute::Reset),
        ResetColor
    )
}

/// Run the player once; a failing player still paces the loop at one second
async fn play(cmd: &[String]) {
    let Some((program, args)) = cmd.split_first() else {
        return;
    };

    let status = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .status()
        .await;

    match status {
        Ok(status) if status.success() => {}
        Ok(status) => {
            tracing::warn!("Alarm command {} exited with {}", program, status);
            sleep(Duration::from_secs(1)).await;
        }
        Err(e) => {
            tracing::warn!("Failed to run alarm command {}: {}", program, e);
            sleep(Duration::from_secs(1)).await;
        }
    }
}

/// Alarm that only logs, counting every call it receives
#[derive(Debug, Default)]
pub struct LogAlarm {
    active: bool,
    start_calls: usize,
    stop_calls: usize,
}

impl LogAlarm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls
    }
}

impl AlarmSink for LogAlarm {
    fn start(&mut self) {
        self.start_calls += 1;
        if !self.active {
            self.active = true;
            tracing::warn!("ALARM: destination reached");
        }
    }

    fn stop(&mut self) {
        self.stop_calls += 1;
        if self.active {
            self.active = false;
            tracing::info!("Alarm silenced");
        }
    }
}
