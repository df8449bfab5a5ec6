use crate::client::github::DEFAULT_REPO_NAME;
use crate::{Args, Command};
use clap::{CommandFactory, Parser};
use std::path::PathBuf;

#[test]
fn given_cli_definition_when_checked_then_clap_accepts_it() {
    Args::command().debug_assert();
}

#[test]
fn given_share_without_repo_when_parsed_then_default_repo_and_files() {
    // When
    let args = Args::try_parse_from(["live-voice", "share", "--token", "t", "notes.txt"]).unwrap();

    // Then
    let Some(Command::Share { repo, token, files }) = args.command else {
        panic!("expected share command");
    };
    assert_eq!(repo, DEFAULT_REPO_NAME);
    assert_eq!(token, "t");
    assert_eq!(files, vec![PathBuf::from("notes.txt")]);
}

#[test]
fn given_share_with_repo_when_parsed_then_repo_used() {
    let args = Args::try_parse_from([
        "live-voice",
        "share",
        "--repo",
        "notes",
        "--token",
        "t",
        "a.txt",
        "b.txt",
    ])
    .unwrap();

    let Some(Command::Share { repo, files, .. }) = args.command else {
        panic!("expected share command");
    };
    assert_eq!(repo, "notes");
    assert_eq!(files.len(), 2);
}

#[test]
fn given_share_without_files_when_parsed_then_rejected() {
    assert!(Args::try_parse_from(["live-voice", "share", "--token", "t"]).is_err());
}

#[test]
fn given_no_subcommand_when_parsed_then_talk_is_implied() {
    let args = Args::try_parse_from(["live-voice"]).unwrap();

    assert!(args.command.is_none());
}
