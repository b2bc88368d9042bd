use assert_cmd::Command;
use std::io::Write;
use std::path::PathBuf;
use std::str;
use tempfile::NamedTempFile;

fn sample_pfx2as() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/pfx2as/routeviews-sample.pfx2as");
    path
}

fn ipmeta() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("ipmeta").unwrap();
    cmd.env_remove("IPMETA_BACKEND").env_remove("RUST_LOG");
    cmd
}

/// Run ipmeta over the sample pfx2as file and return stdout.
fn run_ipmeta(input: &str, args: &[&str]) -> String {
    let sample = sample_pfx2as();
    let output = ipmeta()
        .arg("--pfx2as")
        .arg(&sample)
        .args(args)
        .write_stdin(input)
        .output()
        .expect("failed to execute");
    assert!(
        output.status.success(),
        "ipmeta failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    str::from_utf8(&output.stdout)
        .expect("Failed to read stdout as UTF-8")
        .to_string()
}

fn temp_pfx2as(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file
}

#[test]
fn single_address() {
    let output = run_ipmeta("", &["8.8.8.8"]);
    assert_eq!(output, "8.8.8.8|pfx2as|1|2|||0||0.0|0.0|0||||15169|512|\n");
}

#[test]
fn most_specific_prefix_wins() {
    let output = run_ipmeta("", &["12.1.2.3", "12.200.0.1"]);
    assert_eq!(
        output,
        "12.1.2.3|pfx2as|1|4|||0||0.0|0.0|0||||701_1239|65536|\n\
         12.200.0.1|pfx2as|1|3|||0||0.0|0.0|0||||7018|16777216|\n"
    );
}

#[test]
fn prefix_query_counts_addresses() {
    let output = run_ipmeta("", &["12.0.0.0/8", "1.0.0.0/25", "8.8.0.0/16"]);
    let counts: Vec<(&str, &str)> = output
        .lines()
        .map(|line| {
            let mut fields = line.split('|');
            (fields.next().unwrap(), fields.nth(1).unwrap())
        })
        .collect();
    assert_eq!(
        counts,
        vec![
            ("12.0.0.0/8", "16777216"),
            ("1.0.0.0/25", "128"),
            ("8.8.0.0/16", "256"),
        ]
    );
}

#[test]
fn ipv6_query() {
    let output = run_ipmeta("", &["2001:db8::1"]);
    assert_eq!(output, "2001:db8::1|pfx2as|1|6|||0||0.0|0.0|0||||64500|0|\n");
}

#[test]
fn unmatched_and_invalid_queries_print_nothing() {
    let output = run_ipmeta("", &["9.9.9.9", "not-an-ip", "10.0.0.0/40"]);
    assert_eq!(output, "");
}

#[test]
fn queries_from_stdin() {
    let output = run_ipmeta("8.8.4.4\n# comment\n\n1.0.0.1\n", &[]);
    let queries: Vec<&str> = output.lines().map(|l| l.split('|').next().unwrap()).collect();
    assert_eq!(queries, vec!["8.8.4.4", "1.0.0.1"]);
}

#[test]
fn queries_from_file() {
    let queries = temp_pfx2as("192.0.2.55\r\n8.8.8.8\n");
    let output = run_ipmeta("", &["-f", queries.path().to_str().unwrap()]);
    assert!(output.starts_with("192.0.2.55|pfx2as|1|5|"), "{output}");
    assert!(output.contains("|64496_64497|256|"), "{output}");
    assert_eq!(output.lines().count(), 2);
}

#[test]
fn headers_come_first() {
    let output = run_ipmeta("", &["--headers", "8.8.8.8"]);
    let mut lines = output.lines();
    assert_eq!(
        lines.next().unwrap(),
        "query|provider|ip_count|id|country_code|continent_code|region|polygon_ids|latitude|longitude|metro_code|postal_code|city|conn_speed|asn|asn_ip_count|timezone"
    );
    assert!(lines.next().unwrap().starts_with("8.8.8.8|"));
}

#[test]
fn json_output() {
    let output = run_ipmeta("", &["--json", "8.8.8.0/24"]);
    let value: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
    assert_eq!(value["query"], "8.8.8.0/24");
    assert_eq!(value["provider"], "pfx2as");
    assert_eq!(value["ip_count"], 256);
    assert_eq!(value["record"]["asn"], serde_json::json!([15169]));
}

#[test]
fn provider_filter() {
    assert_eq!(run_ipmeta("", &["-m", "maxmind", "8.8.8.8"]), "");
    assert!(run_ipmeta("", &["-m", "maxmind,pfx2as", "8.8.8.8"]).starts_with("8.8.8.8|pfx2as|"));

    let sample = sample_pfx2as();
    let mut cmd = ipmeta();
    cmd.arg("-p")
        .arg(&sample)
        .args(["-m", "nosuchprovider", "8.8.8.8"]);
    assert_fails_with(cmd, "unknown provider 'nosuchprovider'");
}

#[test]
fn filtering_on_unloaded_provider_warns() {
    let sample = sample_pfx2as();
    let output = ipmeta()
        .arg("-p")
        .arg(&sample)
        .args(["-m", "maxmind", "8.8.8.8"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("provider is not loaded"), "{stderr}");
    assert!(stderr.contains("maxmind"), "{stderr}");
}

#[test]
fn list_backends() {
    let output = ipmeta().arg("--list-backends").output().unwrap();
    assert!(output.status.success());
    let names: Vec<String> = str::from_utf8(&output.stdout)
        .unwrap()
        .lines()
        .map(|l| l.split('\t').next().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["bigarray", "intervaltree", "patricia"]);
}

#[test]
fn list_providers() {
    let output = ipmeta().arg("--list-providers").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("1\tmaxmind\t"));
    assert!(stdout.contains("3\tpfx2as\t"));
}

#[test]
fn unknown_backend_fails() {
    let mut cmd = ipmeta();
    cmd.args(["-b", "skiplist", "8.8.8.8"]);
    assert_fails_with(cmd, "unknown index backend: skiplist");
}

#[test]
fn ipv4_only_backends() {
    let routes = temp_pfx2as("8.8.8.0\t24\t15169\n8.8.8.128\t25\t64512\n");
    for backend in ["bigarray", "intervaltree"] {
        let output = ipmeta()
            .env("IPMETA_BACKEND", backend)
            .arg("-p")
            .arg(routes.path())
            .args(["8.8.8.0/24"])
            .output()
            .unwrap();
        assert!(output.status.success(), "{backend}");
        let stdout = String::from_utf8(output.stdout).unwrap();
        let counts: Vec<&str> = stdout.lines().map(|l| l.split('|').nth(2).unwrap()).collect();
        // The /25 overrides half of the /24 in the array, and overlaps it in
        // the interval tree.
        match backend {
            "bigarray" => assert_eq!(counts, vec!["128", "128"], "{stdout}"),
            _ => assert_eq!(counts, vec!["256", "128"], "{stdout}"),
        }
    }

    // IPv6 prefixes cannot be loaded into an IPv4-only backend.
    let sample = sample_pfx2as();
    let mut cmd = ipmeta();
    cmd.args(["-b", "bigarray", "-p"]).arg(&sample).arg("8.8.8.8");
    assert_fails_with(cmd, "bigarray index does not support IPv6 addresses");
}

#[test]
fn malformed_pfx2as_reports_the_line() {
    let routes = temp_pfx2as("8.8.8.0\t24\t15169\n8.8.8.0\tabc\t15169\n");
    let mut cmd = ipmeta();
    cmd.arg("-p").arg(routes.path()).arg("8.8.8.8");
    assert_fails_with(cmd, "line 2: invalid mask length");
}

/// Run `cmd`, expecting it to fail with `needle` somewhere in stderr.
fn assert_fails_with(mut cmd: Command, needle: &str) {
    let output = cmd.output().expect("failed to execute");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success(), "expected failure, stderr: {stderr}");
    assert!(stderr.contains(needle), "missing {needle:?} in: {stderr}");
}
