use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_card_demo_settles_paid() {
    let mut cmd = Command::new(cargo_bin!("fundpay"));
    cmd.arg("500");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#""outcome":"paid""#))
        .stdout(predicate::str::contains("investment status: paid"));
}

#[test]
fn test_card_demo_decline_keeps_investment_pending() {
    let mut cmd = Command::new(cargo_bin!("fundpay"));
    cmd.arg("500").arg("--decline");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#""outcome":"declined""#))
        .stdout(predicate::str::contains("insufficient funds"))
        .stdout(predicate::str::contains("investment status: pending"));
}

#[test]
fn test_offline_rates_fall_back_without_blocking() {
    let mut cmd = Command::new(cargo_bin!("fundpay"));
    cmd.arg("500").arg("--offline-rates");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#""source":"fallback""#))
        .stdout(predicate::str::contains("825000"))
        .stdout(predicate::str::contains("investment status: paid"));
}

#[test]
fn test_redirect_demo_settles_paid() {
    // Real polling delays: one pending poll, then success.
    let mut cmd = Command::new(cargo_bin!("fundpay"));
    cmd.arg("500").arg("--flow").arg("redirect");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("checkout window opened at"))
        .stdout(predicate::str::contains(r#""outcome":"paid""#))
        .stdout(predicate::str::contains("investment status: paid"));
}

#[test]
fn test_rejects_non_positive_amount() {
    let mut cmd = Command::new(cargo_bin!("fundpay"));
    cmd.arg("0");

    cmd.assert().failure();
}
