//! The Python driver that loads bound tables and runs a snippet.
//!
//! Work directory layout written by the executor:
//!
//! ```text
//! manifest.json   {"output": "result", "tables": {"loans_df": "loans_df.json", ...}}
//! <table>.json    {"columns": [...], "rows": [[...], ...]}
//! snippet.py      generated code
//! harness.py      this script
//! ```
//!
//! Exit codes: 0 with a [`RESULT_TAG`] line on stdout, [`EXIT_FAILED`] with
//! an [`ERROR_TAG`] line when the snippet raises, [`EXIT_MISSING_OUTPUT`]
//! when it finishes without binding the output variable. Anything else means
//! the harness itself could not run (missing pandas, bad interpreter).

/// Prefix of the stdout line carrying the JSON-encoded output value.
pub const RESULT_TAG: &str = "__FINSIGHT_RESULT__";

/// Prefix of the stdout line carrying the JSON-encoded exception text.
pub const ERROR_TAG: &str = "__FINSIGHT_ERROR__";

pub const EXIT_FAILED: i32 = 2;
pub const EXIT_MISSING_OUTPUT: i32 = 3;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SNIPPET_FILE: &str = "snippet.py";
pub const HARNESS_FILE: &str = "harness.py";

/// Columns parsed as datetimes for a given bound table name.
pub const DATE_COLUMNS: &[(&str, &str)] = &[
    ("loans_df", "application_date"),
    ("transactions_df", "timestamp"),
];

/// The harness source. `{DATE_COLUMNS}` is substituted at build time by
/// [`harness_source`].
const HARNESS_TEMPLATE: &str = r#"import json
import os
import sys

import numpy as np
import pandas as pd

RESULT_TAG = "__FINSIGHT_RESULT__"
ERROR_TAG = "__FINSIGHT_ERROR__"
DATE_COLUMNS = {DATE_COLUMNS}


def load_table(path, name):
    with open(path) as f:
        payload = json.load(f)
    df = pd.DataFrame(payload["rows"], columns=payload["columns"])
    for column in DATE_COLUMNS.get(name, []):
        if column in df.columns:
            df[column] = pd.to_datetime(df[column])
    return df


def main(workdir):
    with open(os.path.join(workdir, "manifest.json")) as f:
        manifest = json.load(f)

    namespace = {"pd": pd, "np": np}
    for name, file_name in manifest["tables"].items():
        namespace[name] = load_table(os.path.join(workdir, file_name), name)

    with open(os.path.join(workdir, "snippet.py")) as f:
        code = f.read()

    try:
        exec(code, namespace)
    except Exception as e:
        sys.stdout.write("\n" + ERROR_TAG + json.dumps(str(e)) + "\n")
        sys.stdout.flush()
        sys.exit(2)

    output = manifest["output"]
    if output not in namespace:
        sys.exit(3)

    sys.stdout.write("\n" + RESULT_TAG + json.dumps(str(namespace[output])) + "\n")
    sys.stdout.flush()


if __name__ == "__main__":
    main(sys.argv[1])
"#;

/// Returns the harness script with the date column table filled in.
pub fn harness_source() -> String {
    let mut by_table: std::collections::BTreeMap<&str, Vec<&str>> = Default::default();
    for (table, column) in DATE_COLUMNS {
        by_table.entry(*table).or_default().push(*column);
    }
    let literal = serde_json::to_string(&by_table).unwrap_or_else(|_| "{}".to_string());
    HARNESS_TEMPLATE.replace("{DATE_COLUMNS}", &literal)
}

/// Extracts and decodes the value of the last stdout line starting with `tag`.
pub fn tagged_value(stdout: &str, tag: &str) -> Option<String> {
    stdout
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(tag))
        .map(|payload| {
            serde_json::from_str::<String>(payload).unwrap_or_else(|_| payload.to_string())
        })
}
