use ingest::Fragment;

use crate::schema::{GenerationRequest, SamplingParams};

pub const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "You are an expert assistant in programming and technical documentation.";

const DOCUMENTATION_RULES: &str = r#"1. **File name:** state the name of the analyzed file.
2. **Functional description:** explain clearly and concisely what the file does as a whole.
3. **Technical description:** detail the implementation, including:
   - A list of **all user-defined methods and functions** (ignore functions and methods that come from external libraries or the system).
   - For each function or method, state:
     - The function or method name.
     - The language (C#, JS, etc.).
     - Parameters (name and a short description when it can be inferred).
     - Modified variables (properties or internal/global variables affected).
     - Conditions, validations or requirements inside the function.
     - A detailed description of what the function does, using the logical names of its variables and parameters.
     - Return value (if any).
   - Keep variable and function names exactly as they appear in the code.
   - If there are nested functions, document each one separately.
4. Be precise and do not produce generic explanations."#;

const FRAGMENT_POSITION_RULE: &str = "5. This fragment is part of a larger file: say so and give its position (for example 'Fragment 1 of 3').";

const FIRST_FRAGMENT_RULE: &str = "6. This is the first fragment: start with the file name and the general functional description. Do not wrap the output in Markdown code blocks.";

const CONTINUATION_FRAGMENT_RULE: &str = "6. This is a continuation fragment: do not repeat the file name or the functional description, and do not wrap the output in Markdown code blocks. Document only the technical details of the functions in this fragment.";

/// Renders fragments into documentation requests.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_instruction: String,
    sampling: SamplingParams,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_INSTRUCTION.to_string(), SamplingParams::default())
    }
}

impl PromptBuilder {
    pub fn new(system_instruction: String, sampling: SamplingParams) -> Self {
        Self {
            system_instruction,
            sampling,
        }
    }

    pub fn sampling(&self) -> SamplingParams {
        self.sampling
    }

    pub fn build(&self, path: &str, fragment: &Fragment) -> GenerationRequest {
        GenerationRequest {
            system_instruction: self.system_instruction.clone(),
            user_prompt: build_documentation_prompt(path, fragment),
            sampling: self.sampling,
        }
    }
}

pub fn build_documentation_prompt(path: &str, fragment: &Fragment) -> String {
    let mut rules = String::from(DOCUMENTATION_RULES);

    if !fragment.is_only() {
        rules.push('\n');
        rules.push_str(FRAGMENT_POSITION_RULE);
    }

    rules.push('\n');
    if fragment.is_first() {
        rules.push_str(FIRST_FRAGMENT_RULE);
    } else {
        rules.push_str(CONTINUATION_FRAGMENT_RULE);
    }

    format!(
        r#"Your task is to analyze the following file and write complete technical documentation in Markdown, ready to be used as a README.md.

Fragment {} of {}

INSTRUCTIONS:
{}

File: {}

CODE:
{}"#,
        fragment.index, fragment.total, rules, path, fragment.text
    )
}
