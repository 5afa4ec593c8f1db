use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::fs;
use tempfile::{tempdir, TempDir};

const PROGRAM: &str = "var builder = WebApplication.CreateBuilder(args);\nbuilder.Services.AddRazorPages();\nvar app = builder.Build();\napp.UseAuthorization();\napp.MapRazorPages();\napp.Run();\n";

fn project(packages: &[&str]) -> TempDir {
    let dir = tempdir().unwrap();
    let references: String = packages
        .iter()
        .map(|p| format!("    <PackageReference Include=\"{p}\" Version=\"8.0.0\" />\n"))
        .collect();
    fs::write(
        dir.path().join("Blog.csproj"),
        format!("<Project Sdk=\"Microsoft.NET.Sdk.Web\">\n  <ItemGroup>\n{references}  </ItemGroup>\n</Project>\n"),
    )
    .unwrap();
    fs::write(dir.path().join("Program.cs"), PROGRAM).unwrap();
    dir
}

#[allow(deprecated)]
fn scaffold() -> Command {
    Command::cargo_bin("scaffold").expect("binary")
}

#[test]
fn identity_reports_missing_package_with_install_hint() {
    let dir = project(&[]);
    scaffold()
        .arg("identity")
        .arg("--project")
        .arg(dir.path())
        .arg("--prerelease")
        .assert()
        .failure()
        .stderr(contains(
            "dotnet add package Microsoft.AspNetCore.Identity.EntityFrameworkCore --prerelease",
        ));
    assert_eq!(fs::read_to_string(dir.path().join("Program.cs")).unwrap(), PROGRAM);
}

#[test]
fn identity_updates_program_once() {
    let dir = project(&[
        "Microsoft.AspNetCore.Identity.EntityFrameworkCore",
        "Microsoft.AspNetCore.Identity.UI",
        "Microsoft.EntityFrameworkCore.Sqlite",
    ]);
    let args = [
        "identity",
        "--context",
        "BlogContext",
        "--user",
        "BlogUser",
        "--provider",
        "sqlite",
    ];

    scaffold()
        .args(args)
        .arg("--project")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(contains("updated Program.cs"));

    let program = fs::read_to_string(dir.path().join("Program.cs")).unwrap();
    assert!(program.contains("builder.Services.AddDbContext<BlogContext>(options => options.UseSqlite(connectionString));"));
    assert!(program.contains("AddDefaultIdentity<BlogUser>"));

    scaffold()
        .args(args)
        .arg("--project")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(contains("unchanged Program.cs (0 applied"));
    assert_eq!(fs::read_to_string(dir.path().join("Program.cs")).unwrap(), program);
}

#[test]
fn ide_mode_turns_missing_packages_into_notes() {
    let dir = project(&[]);
    let output = scaffold()
        .arg("minimal-api")
        .arg("--project")
        .arg(dir.path())
        .args(["--context", "BlogContext", "--provider", "postgres", "--model", "Post"])
        .arg("--ide-mode")
        .arg("--json")
        .output()
        .expect("command run");
    assert!(output.status.success());

    let body: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(body["files"][0]["changed"], Value::Bool(true));
    assert_eq!(body["diagnostics"][0]["kind"], "missing_dependency");
    assert_eq!(body["diagnostics"][0]["package"], "Npgsql.EntityFrameworkCore.PostgreSQL");

    let program = fs::read_to_string(dir.path().join("Program.cs")).unwrap();
    assert!(program.contains("options.UseNpgsql("));
    assert!(program.contains("app.MapPostEndpoints();\napp.Run();"));
}

#[test]
fn provider_without_context_is_rejected() {
    let dir = project(&[]);
    scaffold()
        .arg("minimal-api")
        .arg("--project")
        .arg(dir.path())
        .args(["--provider", "sqlite"])
        .assert()
        .failure()
        .stderr(contains("without a context class"));
}

#[test]
fn unknown_provider_is_a_usage_error() {
    scaffold()
        .args(["ef-controller", "--context", "BlogContext", "--provider", "oracle"])
        .assert()
        .failure()
        .stderr(contains("unknown database provider"));
}

#[test]
fn scenarios_lists_builtins() {
    scaffold()
        .arg("scenarios")
        .assert()
        .success()
        .stdout(contains("identity"))
        .stdout(contains("efController"));
}
