use std::fmt::Display;

use clap::ValueEnum;
use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::Value;

use crate::error::result::CliResult;

pub const P11_CLI_FORMAT: &str = "P11_CLI_FORMAT";

/// How results are written on stdout
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn serialize_fields<S: Serializer>(
    fields: &[(String, String)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(fields.len()))?;
    for (name, value) in fields {
        map.serialize_entry(name, value)?;
    }
    map.end()
}

/// The result of a command.
///
/// In text mode, the message is printed first, then the named values in
/// insertion order, then the items one per line. In JSON mode the whole
/// structure is printed.
#[derive(Serialize, Debug, Default)]
pub struct Stdout {
    stdout: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    handle: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_key_handle: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    private_key_handle: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    handles: Option<Vec<u64>>,
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serialize_fields"
    )]
    values: Vec<(String, String)>,
    #[serde(skip)]
    lines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    items: Option<Value>,
}

impl Stdout {
    #[must_use]
    pub fn new(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_owned(),
            ..Default::default()
        }
    }

    pub fn set_handle<H: Into<u64>>(&mut self, handle: H) {
        self.handle = Some(handle.into());
    }

    pub fn set_key_pair_handles<H: Into<u64>>(&mut self, public_key: H, private_key: H) {
        self.public_key_handle = Some(public_key.into());
        self.private_key_handle = Some(private_key.into());
    }

    pub fn set_handles<H: Into<u64> + Copy>(&mut self, handles: &[H]) {
        self.handles = Some(handles.iter().map(|h| (*h).into()).collect());
    }

    /// Add a named value; byte strings are usually given hex encoded
    pub fn add_value(&mut self, name: &str, value: impl Display) {
        self.values.push((name.to_owned(), value.to_string()));
    }

    /// Set the items of a listing
    ///
    /// # Errors
    /// Fails if the items cannot be serialized.
    pub fn set_items<T: Serialize + Display>(&mut self, items: &[T]) -> CliResult<()> {
        self.lines = items.iter().map(ToString::to_string).collect();
        self.items = Some(serde_json::to_value(items)?);
        Ok(())
    }

    /// Set a single item, such as an information structure
    ///
    /// # Errors
    /// Fails if the item cannot be serialized.
    pub fn set_item<T: Serialize + Display>(&mut self, item: &T) -> CliResult<()> {
        self.lines = vec![item.to_string()];
        self.items = Some(serde_json::to_value(item)?);
        Ok(())
    }

    fn to_text(&self) -> String {
        let mut lines = Vec::new();
        if !self.stdout.is_empty() {
            lines.push(self.stdout.clone());
        }
        if let Some(handle) = self.handle {
            lines.push(format!("\t  Handle: {handle}"));
        }
        if let Some(handle) = self.public_key_handle {
            lines.push(format!("\t  Public key handle: {handle}"));
        }
        if let Some(handle) = self.private_key_handle {
            lines.push(format!("\t  Private key handle: {handle}"));
        }
        if let Some(handles) = &self.handles {
            lines.extend(handles.iter().map(ToString::to_string));
        }
        for (name, value) in &self.values {
            lines.push(format!("{name}: {value}"));
        }
        lines.extend(self.lines.iter().cloned());
        lines.join("\n")
    }

    /// # Errors
    /// Fails if the JSON serialization fails.
    pub fn render(&self, format: OutputFormat) -> CliResult<String> {
        Ok(match format {
            OutputFormat::Json => serde_json::to_string_pretty(&self)?,
            OutputFormat::Text => self.to_text(),
        })
    }

    /// # Errors
    /// Fails if the JSON serialization fails.
    #[allow(clippy::print_stdout)]
    pub fn write(&self, format: OutputFormat) -> CliResult<()> {
        let output = self.render(format)?;
        if !output.is_empty() {
            println!("{output}");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::Value;

    use super::{OutputFormat, Stdout};

    #[test]
    fn text_output() {
        let mut stdout = Stdout::new("AES key generated.");
        stdout.set_handle(12_u64);
        stdout.add_value("Ciphertext", "00ff");
        let text = stdout.render(OutputFormat::Text).unwrap();
        assert_eq!(
            text,
            "AES key generated.\n\t  Handle: 12\nCiphertext: 00ff"
        );
    }

    #[test]
    fn json_output_keeps_value_order() {
        let mut stdout = Stdout::new("done");
        stdout.set_key_pair_handles(1_u64, 2_u64);
        stdout.add_value("zeta", 1);
        stdout.add_value("alpha", 2);
        let json = stdout.render(OutputFormat::Json).unwrap();
        assert!(json.find("zeta").unwrap() < json.find("alpha").unwrap());
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["public_key_handle"], 1);
        assert_eq!(value["private_key_handle"], 2);
        assert_eq!(value["values"]["alpha"], "2");
        assert!(value.get("handle").is_none());
    }

    #[test]
    fn items_are_listed_one_per_line() {
        let mut stdout = Stdout::new("");
        stdout.set_items(&["a", "b"]).unwrap();
        assert_eq!(stdout.render(OutputFormat::Text).unwrap(), "a\nb");
        let value: Value =
            serde_json::from_str(&stdout.render(OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(value["items"][1], "b");
    }
}
