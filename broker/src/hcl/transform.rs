//! Line-oriented HCL rewrites applied to `show` output when subsuming resources

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{BrokerError, Result};
use crate::workspace::encoding::null_as_default;

static RESOURCE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"resource "(.*)" "(.*)""#).expect("valid regex"));
static VALUE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\S*)\s*=\s*(.*)\s*$").expect("valid regex"));
static BLOCK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\S*)\s*\{\s*$").expect("valid regex"));

/// Maps an IaC variable to the parameter expression that replaces its value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterMapping {
    #[serde(rename = "TfVariable", alias = "tf_variable")]
    pub tf_variable: String,

    #[serde(rename = "ParameterName", alias = "parameter_name")]
    pub parameter_name: String,
}

impl ParameterMapping {
    pub fn new(tf_variable: impl Into<String>, parameter_name: impl Into<String>) -> Self {
        Self {
            tf_variable: tf_variable.into(),
            parameter_name: parameter_name.into(),
        }
    }
}

/// Describes how imported HCL is rewritten before it is applied
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transformer {
    #[serde(default, deserialize_with = "null_as_default")]
    pub parameter_mappings: Vec<ParameterMapping>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters_to_remove: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters_to_add: Vec<ParameterMapping>,
}

/// Block labels indexed by brace depth
#[derive(Default)]
struct BlockStack(Vec<String>);

impl BlockStack {
    fn get(&self, depth: i64) -> &str {
        usize::try_from(depth)
            .ok()
            .and_then(|d| self.0.get(d))
            .map(String::as_str)
            .unwrap_or("")
    }

    fn set(&mut self, depth: i64, label: String) {
        let Ok(depth) = usize::try_from(depth) else {
            return;
        };
        if self.0.len() <= depth {
            self.0.resize(depth + 1, String::new());
        }
        self.0[depth] = label;
    }
}

fn brace_count(line: &str, count: i64) -> i64 {
    count + line.matches('{').count() as i64 - line.matches('}').count() as i64
}

impl Transformer {
    /// Run Clean, Add and Replace in order.
    ///
    /// Returns the rewritten HCL and the values captured for `var.`/`local.` mappings.
    pub fn transform(&self, tf: &str) -> Result<(String, BTreeMap<String, String>)> {
        let cleaned = self.clean_tf(tf);
        let added = self.add_parameters_in_tf(&cleaned);
        self.replace_parameters_in_tf(&added)
    }

    /// Remove the lines named by `parameters_to_remove`.
    ///
    /// Attributes are removed line by line, nested blocks up to their closing brace.
    pub fn clean_tf(&self, tf: &str) -> String {
        let mut depth: i64 = 0;
        let mut stack = BlockStack::default();
        let mut skip_block_depth: i64 = 0;
        let mut out = String::with_capacity(tf.len());

        for line in tf.lines() {
            let mut skip_line = !(skip_block_depth == 0 || depth < skip_block_depth);
            depth = brace_count(line, depth);

            if depth < skip_block_depth {
                skip_block_depth = 0;
            }

            if let Some(caps) = RESOURCE_LINE.captures(line) {
                stack.set(depth, format!("{}.{}", &caps[1], &caps[2]));
            } else if let Some(caps) = VALUE_LINE.captures(line) {
                let path = format!("{}.{}", stack.get(depth), &caps[1]);
                if self.parameters_to_remove.contains(&path) {
                    skip_line = true;
                }
            } else if let Some(caps) = BLOCK_LINE.captures(line) {
                let path = format!("{}.{}", stack.get(depth - 1), &caps[1]);
                let remove = self.parameters_to_remove.contains(&path);
                stack.set(depth, path);
                if remove {
                    skip_block_depth = depth;
                    skip_line = true;
                }
            }

            if !skip_line {
                out.push_str(line);
                out.push('\n');
            }
        }

        out
    }

    /// Insert `parameters_to_add` attributes after the matching `resource` line
    pub fn add_parameters_in_tf(&self, tf: &str) -> String {
        let mut depth: i64 = 0;
        let mut stack = BlockStack::default();
        let mut out = String::with_capacity(tf.len());

        for line in tf.lines() {
            depth = brace_count(line, depth);
            out.push_str(line);
            out.push('\n');

            let Some(caps) = RESOURCE_LINE.captures(line) else {
                continue;
            };
            stack.set(depth, format!("{}.{}", &caps[1], &caps[2]));

            for addition in &self.parameters_to_add {
                let Some((prefix, attribute)) = addition.tf_variable.rsplit_once('.') else {
                    continue;
                };
                if prefix == stack.get(depth) {
                    out.push_str(&format!("{} = {}\n", attribute, addition.parameter_name));
                }
            }
        }

        out
    }

    /// Replace mapped values with their parameter expressions, capturing the old scalar values
    pub fn replace_parameters_in_tf(&self, tf: &str) -> Result<(String, BTreeMap<String, String>)> {
        let captured = self.capture_parameter_values(tf)?;
        let replaced = self.replace_parameters(tf)?;
        Ok((replaced, captured))
    }

    fn capture_parameter_values(&self, tf: &str) -> Result<BTreeMap<String, String>> {
        let mut values = BTreeMap::new();

        for mapping in &self.parameter_mappings {
            let var = regex::escape(&mapping.tf_variable);
            let block = compile(&format!(r"(?m){}[\s]*=[\s]+(\{{[\s\S.]*?\}})", var))?;
            let simple = compile(&format!(r#"(?m){}[\s]*=[\s"]*(.*[^"\s])"#, var))?;

            // Block values are recognised so they are not mistaken for scalars.
            if block.is_match(tf) {
                continue;
            }
            let Some(caps) = simple.captures(tf) else {
                continue;
            };
            let name = mapping
                .parameter_name
                .strip_prefix("var.")
                .or_else(|| mapping.parameter_name.strip_prefix("local."));
            if let Some(name) = name {
                values.insert(name.to_string(), caps[1].to_string());
            }
        }

        Ok(values)
    }

    fn replace_parameters(&self, tf: &str) -> Result<String> {
        let mut tf = tf.to_string();

        for mapping in &self.parameter_mappings {
            let var = regex::escape(&mapping.tf_variable);
            let replacement = format!("{} = {}", mapping.tf_variable, mapping.parameter_name);

            for pattern in [
                format!(r"(?m){}[\s]*=[\s]+\{{[\s\S.]*?\}}", var),
                format!(r"(?m){}[\s]*=[\s]+\[[\s\S.]*?\]", var),
                format!(r"(?m){}[\s]*=.*$", var),
            ] {
                let re = compile(&pattern)?;
                tf = re.replace_all(&tf, regex::NoExpand(&replacement)).into_owned();
            }
        }

        Ok(tf)
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| BrokerError::Internal(format!("invalid pattern {}: {}", pattern, e)))
}
