use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn jdismantle_path() -> String {
    std::env::var("CARGO_BIN_EXE_jdismantle").unwrap_or_else(|_| {
        let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("target");
        path.push("debug");
        path.push("jdismantle");
        if cfg!(windows) {
            path.set_extension("exe");
        }
        path.to_string_lossy().to_string()
    })
}

fn run(args: &[&str]) -> Output {
    Command::new(jdismantle_path())
        .args(args)
        .output()
        .expect("run jdismantle")
}

fn utf8(bytes: &mut Vec<u8>, value: &str) {
    bytes.push(1);
    bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
    bytes.extend_from_slice(value.as_bytes());
}

fn class_ref(bytes: &mut Vec<u8>, name_index: u16) {
    bytes.push(7);
    bytes.extend_from_slice(&name_index.to_be_bytes());
}

/// `public class Hello { static void run() { int unused = 0; } }`, roughly.
fn hello_class() -> Vec<u8> {
    let mut bytes = vec![0xca, 0xfe, 0xba, 0xbe, 0x00, 0x00, 0x00, 52];
    bytes.extend_from_slice(&8u16.to_be_bytes());
    utf8(&mut bytes, "Hello");
    class_ref(&mut bytes, 1);
    utf8(&mut bytes, "java/lang/Object");
    class_ref(&mut bytes, 3);
    utf8(&mut bytes, "run");
    utf8(&mut bytes, "()V");
    utf8(&mut bytes, "Code");
    for value in [0x0021u16, 2, 4, 0, 0, 1] {
        bytes.extend_from_slice(&value.to_be_bytes());
    }
    // static void run()
    for value in [0x0008u16, 5, 6, 1, 7] {
        bytes.extend_from_slice(&value.to_be_bytes());
    }
    let code = [0x03, 0x3b, 0xb1];
    let attribute_len = 2 + 2 + 4 + code.len() as u32 + 2 + 2;
    bytes.extend_from_slice(&attribute_len.to_be_bytes());
    bytes.extend_from_slice(&1u16.to_be_bytes());
    bytes.extend_from_slice(&1u16.to_be_bytes());
    bytes.extend_from_slice(&(code.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&code);
    bytes.extend_from_slice(&0u16.to_be_bytes());
    bytes.extend_from_slice(&0u16.to_be_bytes());
    // class attributes
    bytes.extend_from_slice(&0u16.to_be_bytes());
    bytes
}

fn write_hello(dir: &Path) -> PathBuf {
    let path = dir.join("Hello.class");
    std::fs::write(&path, hello_class()).expect("write class");
    path
}

#[test]
fn jdismantle_exits_non_zero_on_missing_input() {
    let output = run(&["--input", "missing.class"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("input not found"), "{stderr}");
}

#[test]
fn jdismantle_lists_readable_classes_but_fails_on_a_corrupt_one() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(temp_dir.path().join("Broken.class"), [0xde, 0xad, 0xbe, 0xef])
        .expect("write class");
    write_hello(temp_dir.path());

    let output = run(&["--input", temp_dir.path().to_str().expect("utf-8 path")]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to parse"), "{stderr}");
    assert!(stderr.contains("1 of 2 classes could not be read"), "{stderr}");
    let stdout = String::from_utf8(output.stdout).expect("utf-8 stdout");
    assert!(stdout.contains("class Hello extends java.lang.Object\n"), "{stdout}");
    assert!(!stdout.contains("Broken"), "{stdout}");
}

#[test]
fn jdismantle_prints_a_text_listing() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let path = write_hello(temp_dir.path());

    let output = run(&["--input", path.to_str().expect("utf-8 path")]);

    assert!(output.status.success(), "{:?}", output);
    let stdout = String::from_utf8(output.stdout).expect("utf-8 stdout");
    assert!(stdout.contains("class Hello extends java.lang.Object\n"), "{stdout}");
    assert!(stdout.contains("  method static run()V\n"), "{stdout}");
    assert!(stdout.contains("    [    0]  iconst_0\n"), "{stdout}");
    assert!(stdout.contains("    [    1]  istore_0\n"), "{stdout}");
    assert!(stdout.contains("    [    2]  return\n"), "{stdout}");
}

#[test]
fn jdismantle_writes_json_to_the_output_file() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let path = write_hello(temp_dir.path());
    let out_path = temp_dir.path().join("listing.json");

    let output = run(&[
        "--input",
        temp_dir.path().to_str().expect("utf-8 path"),
        "--format",
        "json",
        "--output",
        out_path.to_str().expect("utf-8 path"),
    ]);

    assert!(output.status.success(), "{:?}", output);
    let text = std::fs::read_to_string(&out_path).expect("read output");
    let value: serde_json::Value = serde_json::from_str(&text).expect("parse JSON");
    let classes = value.as_array().expect("class array");
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0]["source"], path.display().to_string());
    assert_eq!(classes[0]["class_name"], "Hello");
    let instructions = classes[0]["methods"][0]["instructions"]
        .as_array()
        .expect("instructions");
    let mnemonics: Vec<&str> = instructions
        .iter()
        .map(|insn| insn["mnemonic"].as_str().expect("mnemonic"))
        .collect();
    assert_eq!(mnemonics, vec!["iconst_0", "istore_0", "return"]);
    assert_eq!(instructions[2]["pc"], 2);
}
