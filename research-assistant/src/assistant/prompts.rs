use serde::{Deserialize, Serialize};
use std::fmt;

/// Tools a stage is allowed to reach for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    WebSearch,
}

/// The three fixed steps of a report run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Research,
    Visualize,
    Write,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Research, Stage::Visualize, Stage::Write];

    pub fn role(self) -> &'static str {
        match self {
            Stage::Research => "Senior Research Analyst",
            Stage::Visualize => "Data Visualization Specialist",
            Stage::Write => "Technical Writer",
        }
    }

    pub fn goal(self) -> &'static str {
        match self {
            Stage::Research => {
                "Conduct comprehensive research and create detailed analysis with visualizations"
            }
            Stage::Visualize => "Create compelling visualizations and diagrams from research data",
            Stage::Write => "Create comprehensive and well-structured technical documentation",
        }
    }

    pub fn backstory(self) -> &'static str {
        match self {
            Stage::Research => {
                "You are an elite research analyst with expertise in creating comprehensive \
                 reports with data visualization. You excel at identifying patterns, creating \
                 relationships between concepts, and presenting information in an engaging and \
                 visually appealing manner."
            }
            Stage::Visualize => {
                "You specialize in transforming complex data into clear, visually appealing \
                 diagrams and charts. You have expertise in creating mermaid diagrams, \
                 relationship graphs, and other visual representations."
            }
            Stage::Write => {
                "You are an experienced technical writer who excels at creating clear, engaging, \
                 and well-organized documentation. You know how to present complex information \
                 in an accessible format."
            }
        }
    }

    pub fn tools(self) -> &'static [Tool] {
        &[Tool::WebSearch]
    }

    /// Only the research analyst may hand work to the other roles.
    pub fn allows_delegation(self) -> bool {
        matches!(self, Stage::Research)
    }

    pub fn expected_output(self) -> &'static str {
        match self {
            Stage::Research => "Detailed research findings in JSON format",
            Stage::Visualize => "A collection of visual elements in markdown format",
            Stage::Write => "A complete markdown report with all elements integrated",
        }
    }

    pub fn task_description(self, topic: &str) -> String {
        match self {
            Stage::Research => format!(
                "Conduct comprehensive research on {topic}. Include:\n\
                 1. Latest developments and trends\n\
                 2. Key players and technologies\n\
                 3. Market analysis and future predictions\n\
                 4. Potential challenges and solutions\n\
                 5. Related research papers and citations\n\n\
                 Format the findings in a structured JSON format for visualization."
            ),
            Stage::Visualize => format!(
                "Create visual representations for the research on {topic}:\n\
                 1. Generate a mermaid diagram showing the relationship between key concepts\n\
                 2. Create a relationship graph of key players and technologies\n\
                 3. Design a timeline of developments\n\
                 4. Visualize market trends and predictions"
            ),
            Stage::Write => format!(
                "Create a comprehensive report on {topic} including:\n\
                 1. Executive Summary\n\
                 2. Detailed Analysis\n\
                 3. Visual Elements\n\
                 4. Citations and References\n\
                 5. Future Outlook\n\n\
                 Format the report in markdown with clear sections and styling."
            ),
        }
    }

    pub fn system_prompt(self) -> String {
        let tools = self
            .tools()
            .iter()
            .map(|t| match t {
                Tool::WebSearch => "web search results supplied in the prompt",
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "You are {role}.\nGoal: {goal}\n\n{backstory}\n\nAvailable tools: {tools}.",
            role = self.role(),
            goal = self.goal(),
            backstory = self.backstory(),
        )
    }

    /// Tag wrapping this stage's output when handed to later stages.
    pub fn context_tag(self) -> &'static str {
        match self {
            Stage::Research => "Research Findings",
            Stage::Visualize => "Visual Elements",
            Stage::Write => "Report Draft",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Research => "research",
            Stage::Visualize => "visualize",
            Stage::Write => "write",
        })
    }
}

pub const NO_DIAGRAMS_INSTRUCTION: &str =
    "Do not include mermaid diagrams; describe visual elements in prose instead.";

pub const DIAGRAM_FORMAT_INSTRUCTION: &str = "Write every diagram as a fenced ```mermaid code block \
     and every display equation between $$ delimiters.";

pub fn depth_instruction(depth: u8) -> String {
    format!("Research depth: {depth} of 5. Higher depth means more detail and more sources.")
}

/// Wrap a block of context the way every stage prompt expects it.
pub fn tagged(tag: &str, body: &str) -> String {
    format!("<{tag}>\n{body}\n</{tag}>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_descriptions_reference_topic() {
        for stage in Stage::ALL {
            assert!(stage.task_description("fusion power").contains("fusion power"));
        }
    }

    #[test]
    fn only_research_delegates() {
        assert!(Stage::Research.allows_delegation());
        assert!(!Stage::Visualize.allows_delegation());
        assert!(!Stage::Write.allows_delegation());
    }

    #[test]
    fn system_prompt_carries_role_and_goal() {
        let prompt = Stage::Write.system_prompt();
        assert!(prompt.starts_with("You are Technical Writer."));
        assert!(prompt.contains(Stage::Write.goal()));
    }

    #[test]
    fn tagged_wraps_body() {
        assert_eq!(tagged("Sources", "a"), "<Sources>\na\n</Sources>");
    }
}
