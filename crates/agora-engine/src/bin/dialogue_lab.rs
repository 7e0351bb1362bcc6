//! Offline scenario runner for the dialogue engine.
//!
//! Replays a JSON scenario file against a fresh engine and prints the
//! resulting trace or selection as JSON, for inspecting engine behavior
//! without a collaborator frontend.

use std::fs;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use agora_engine::{
    ArgumentId, Clock, CompilePhase, DialogueEngine, DialogueMove, LocusPath, SelectionRule,
    SelectorConfig, StepperConfig, VoterId,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(error) = run(std::env::args().skip(1).collect()) {
        eprintln!("{error:#}");
        std::process::exit(2);
    }
}

fn run(args: Vec<String>) -> Result<()> {
    if args.is_empty() {
        bail!("{}", usage());
    }
    match args[0].as_str() {
        "step" => run_step(&args[1..]),
        "select" => run_select(&args[1..]),
        "help" | "--help" | "-h" => {
            println!("{}", usage());
            Ok(())
        }
        other => bail!("unknown subcommand '{other}'\n\n{}", usage()),
    }
}

fn usage() -> String {
    [
        "dialogue_lab usage:",
        "  dialogue_lab step --scenario <path> [--phase neutral|focus_advocate|focus_challenger]",
        "  dialogue_lab select --scenario <path>",
    ]
    .join("\n")
}

// ---------------------------------------------------------------------------
// step
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StepScenario {
    moves: Vec<DialogueMove>,
    #[serde(default)]
    picks: Vec<AdditivePick>,
}

#[derive(Debug, Deserialize)]
struct AdditivePick {
    parent: String,
    child: String,
}

fn run_step(args: &[String]) -> Result<()> {
    let (scenario_path, phase) = parse_step_flags(args)?;
    let raw = fs::read_to_string(&scenario_path)
        .with_context(|| format!("reading scenario {scenario_path}"))?;
    let scenario: StepScenario =
        serde_json::from_str(&raw).context("parsing step scenario")?;

    let engine = DialogueEngine::new(
        Clock::System,
        StepperConfig::default(),
        SelectorConfig::default(),
    );
    let dialogue = engine.create_dialogue();
    for mv in scenario.moves {
        engine.record_move(dialogue, mv)?;
    }
    engine.compile(dialogue, phase)?;
    for pick in scenario.picks {
        let parent = LocusPath::parse(&pick.parent)
            .with_context(|| format!("pick parent {:?}", pick.parent))?;
        engine.pick_additive(dialogue, parent, pick.child)?;
    }
    let outcome = engine.compile(dialogue, phase)?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn parse_step_flags(args: &[String]) -> Result<(String, CompilePhase)> {
    let mut scenario = None;
    let mut phase = CompilePhase::Neutral;
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--scenario" => {
                index += 1;
                scenario = Some(
                    args.get(index)
                        .context("--scenario requires a path")?
                        .clone(),
                );
            }
            "--phase" => {
                index += 1;
                let value = args.get(index).context("--phase requires a value")?;
                phase = match value.as_str() {
                    "neutral" => CompilePhase::Neutral,
                    "focus_advocate" => CompilePhase::FocusAdvocate,
                    "focus_challenger" => CompilePhase::FocusChallenger,
                    other => bail!("unknown phase '{other}'"),
                };
            }
            flag => bail!("unknown flag for step: {flag}"),
        }
        index += 1;
    }
    Ok((scenario.context("missing required --scenario <path>")?, phase))
}

// ---------------------------------------------------------------------------
// select
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SelectScenario {
    arguments: Vec<String>,
    approvals: Vec<(String, String)>,
    #[serde(default)]
    conflicts: Vec<(String, String)>,
    rule: SelectionRule,
    k: usize,
}

fn run_select(args: &[String]) -> Result<()> {
    let mut scenario_path = None;
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--scenario" => {
                index += 1;
                scenario_path = Some(
                    args.get(index)
                        .context("--scenario requires a path")?
                        .clone(),
                );
            }
            flag => bail!("unknown flag for select: {flag}"),
        }
        index += 1;
    }
    let scenario_path = scenario_path.context("missing required --scenario <path>")?;
    let raw = fs::read_to_string(&scenario_path)
        .with_context(|| format!("reading scenario {scenario_path}"))?;
    let scenario: SelectScenario =
        serde_json::from_str(&raw).context("parsing select scenario")?;

    let arguments: Vec<ArgumentId> = scenario.arguments.into_iter().map(ArgumentId).collect();
    let approvals: Vec<(VoterId, ArgumentId)> = scenario
        .approvals
        .into_iter()
        .map(|(voter, argument)| (VoterId(voter), ArgumentId(argument)))
        .collect();
    let conflicts: Vec<(ArgumentId, ArgumentId)> = scenario
        .conflicts
        .into_iter()
        .map(|(a, b)| (ArgumentId(a), ArgumentId(b)))
        .collect();

    let engine = DialogueEngine::default();
    let selection = engine.select(
        scenario_path.as_str(),
        &arguments,
        &approvals,
        &conflicts,
        scenario.rule,
        scenario.k,
    )?;
    println!("{}", serde_json::to_string_pretty(&selection)?);
    Ok(())
}
