// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{Empty, EventLog};
use camino_tempfile::tempdir;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::fs;
use unitrun_runner::{
    config::RunnerConfig,
    errors::ExecuteError,
    list::Partitioning,
    registry::{MethodRef, SuiteBuilder},
    runner::TestExecutor,
    test_filter::GroupFilter,
};

#[test]
fn profile_configures_executor() {
    let dir = tempdir().expect("tempdir created");
    let config_path = dir.path().join("unitrun.toml");
    fs::write(
        &config_path,
        indoc! {r#"
            [profile.ci]
            concurrent = true
            test-threads = 2
            partitioning = "per-test"
            sort-by-name = true
            groups = ["smoke"]
        "#},
    )
    .expect("config written");

    let config = RunnerConfig::from_sources(dir.path(), Some(&config_path)).expect("valid config");
    let profile = config.profile("ci").expect("ci profile exists");
    let mut builder = TestExecutor::builder();
    builder.apply_profile(&profile).expect("valid profile");
    let executor = builder.build().expect("valid settings");

    let settings = executor.settings();
    assert!(settings.concurrent());
    assert_eq!(settings.test_threads(), 2);
    assert_eq!(settings.partitioning(), Partitioning::PerTest);
    assert!(settings.sort_by_name());
    assert!(!settings.marshal_events());
    assert_eq!(
        settings.groups(),
        &GroupFilter::new(["smoke"]).expect("valid group")
    );

    let ty = SuiteBuilder::<Empty>::new("app.Configured")
        .default_constructor()
        .test_with("zeta", |_, _| Ok(()), |m| m.group("smoke"))
        .test_with("alpha", |_, _| Ok(()), |m| m.group("smoke"))
        .test("unselected", |_, _| Ok(()))
        .build();
    let log = EventLog::attach(executor.events());
    let stats = executor
        .execute(MethodRef::tests_of(&ty))
        .expect("run completes");
    assert_eq!(stats.passed, 2);
    assert_eq!(log.run_started_total(), Some(2));
}

#[test]
fn blank_group_in_profile_is_rejected() {
    let dir = tempdir().expect("tempdir created");
    let config_path = dir.path().join("unitrun.toml");
    fs::write(
        &config_path,
        indoc! {r#"
            [profile.default]
            groups = ["  "]
        "#},
    )
    .expect("config written");

    let config = RunnerConfig::from_sources(dir.path(), Some(&config_path)).expect("valid config");
    let profile = config
        .profile(RunnerConfig::DEFAULT_PROFILE)
        .expect("default profile exists");
    let mut builder = TestExecutor::builder();
    assert!(matches!(
        builder.apply_profile(&profile),
        Err(ExecuteError::InvalidArgument { name: "groups", .. })
    ));
}
