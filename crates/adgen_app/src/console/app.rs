use std::io::{self, BufRead};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use adgen_core::{update, AppState, Msg};
use adgen_logging::adgen_info;

use super::commands::{self, Command, HELP};
use super::config::AppConfig;
use super::effects::EffectRunner;
use super::render;

const ENGINE_DRAIN_INTERVAL: Duration = Duration::from_millis(20);

enum Input {
    Msg(Msg),
    Help,
    Quit,
    Invalid(String),
}

pub fn run_app(config: AppConfig) -> anyhow::Result<()> {
    let runner = EffectRunner::new(&config)?;
    let mut screen = Screen::new(AppState::with_settings(config.state_settings()));
    let (input_tx, input_rx) = mpsc::channel::<Input>();

    // Poll cadence; the reducer decides which jobs actually get polled.
    let tick_tx = input_tx.clone();
    let poll_interval = config.poll_interval();
    thread::spawn(move || {
        while tick_tx.send(Input::Msg(Msg::PollTick)).is_ok() {
            thread::sleep(poll_interval);
        }
    });

    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let input = match commands::parse(&line) {
                None => continue,
                Some(Ok(Command::Send(msg))) => Input::Msg(msg),
                Some(Ok(Command::Help)) => Input::Help,
                Some(Ok(Command::Quit)) => Input::Quit,
                Some(Err(err)) => Input::Invalid(err.to_string()),
            };
            if input_tx.send(input).is_err() {
                return;
            }
        }
        let _ = input_tx.send(Input::Quit);
    });

    adgen_info!("adgen console started against {}", config.base_url);
    println!("{}", render::render(&screen.state.view()));
    screen.dispatch(Msg::ScreenOpened, &runner);

    loop {
        match input_rx.recv_timeout(ENGINE_DRAIN_INTERVAL) {
            Ok(Input::Msg(msg)) => screen.dispatch(msg, &runner),
            Ok(Input::Help) => println!("{HELP}"),
            Ok(Input::Invalid(message)) => println!("{message}"),
            Ok(Input::Quit) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        for msg in runner.drain() {
            screen.dispatch(msg, &runner);
        }
    }

    screen.dispatch(Msg::ScreenClosed, &runner);
    runner.shutdown();
    adgen_info!("adgen console closed");
    Ok(())
}

struct Screen {
    state: AppState,
}

impl Screen {
    fn new(state: AppState) -> Self {
        Self { state }
    }

    fn dispatch(&mut self, msg: Msg, runner: &EffectRunner) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        if !effects.is_empty() {
            runner.enqueue(effects);
        }
        let view = self.state.view();
        if self.state.consume_dirty() {
            println!("{}", render::render(&view));
        }
    }
}
