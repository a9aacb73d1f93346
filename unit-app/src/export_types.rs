use std::borrow::Cow;

use specta_typescript::Typescript;
use unit_app_lib::mk_specta;

const DEFAULT_PATH: &str = "ui/bindings.ts";

pub fn main() {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_PATH.to_string());

    let mut lang = Typescript::new();
    lang.header = Cow::Borrowed(
        "/* Generated by export-types, do not edit */\n/* eslint @typescript-eslint/no-unused-vars: 0 */",
    );

    mk_specta()
        .export(lang, &path)
        .expect("Failed to export types");

    println!("Exported commands, events and types for the UI to {path}");
}
