//! The fixed analysis instruction sent with every image.
//!
//! The instruction is modelled as an immutable value rather than an inline
//! string: [`ANALYSIS_TEMPLATE`] enumerates the sections the model must
//! produce, and [`InstructionTemplate::render`] turns them into the system
//! message. Tests can inspect the sections directly, and any wording change
//! goes with a bump of [`InstructionTemplate::version`].
//!
//! Users cannot edit or override the instruction.

/// Text part accompanying the image in the user turn.
pub const USER_IMAGE_LABEL: &str = "Here is the embryo image I uploaded.";

/// One required section of the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    /// Markdown heading the model must use (rendered as `## {heading}`).
    pub heading: &'static str,
    /// What the section must cover.
    pub guidance: &'static str,
}

/// A versioned system instruction made of ordered sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionTemplate {
    pub version: u32,
    pub preamble: &'static str,
    pub sections: &'static [Section],
    pub format_rules: &'static [&'static str],
}

/// Heading of the section carrying the informational-only disclaimer.
pub const PROBABILITY_HEADING: &str = "Success Probability";

/// Disclaimer the probability section must state explicitly.
pub const INFORMATIONAL_DISCLAIMER: &str =
    "This estimate is for informational purposes only and is not medical advice.";

/// The instruction used for every analysis request.
pub const ANALYSIS_TEMPLATE: InstructionTemplate = InstructionTemplate {
    version: 2,
    preamble: "Analyze the uploaded embryo image and provide a detailed explanation.\n\
The response must include the following sections, in this order:",
    sections: &[
        Section {
            heading: "Key Structures",
            guidance: "Identify the zona pellucida, inner cell mass (ICM) and trophectoderm (TE), \
noting which are visible.",
        },
        Section {
            heading: "Developmental Stage",
            guidance: "Classify the stage (cleavage, morula, blastocyst) with the visual and \
structural evidence for it.",
        },
        Section {
            heading: "Embryo Grading",
            guidance: "Give a general grade based on visible traits or a qualitative description \
(e.g. high, medium, low quality).",
        },
        Section {
            heading: "Abnormalities",
            guidance: "Report observed abnormalities such as fragmentation or irregular cell \
division, or state that none are visible.",
        },
        Section {
            heading: PROBABILITY_HEADING,
            guidance: "Give a general overview of success probabilities based on implantation \
factors. State explicitly: \"This estimate is for informational purposes only and is not \
medical advice.\"",
        },
        Section {
            heading: "Conclusion",
            guidance: "Summarise the findings in two or three sentences.",
        },
    ],
    format_rules: &[
        "Format the response in Markdown.",
        "Use a `##` heading for each section, exactly as named above.",
        "Use bullet points for sub-points; each key point on its own line.",
        "Keep the response concise, clear and easy to read.",
    ],
};

impl InstructionTemplate {
    /// Render the system message.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(1024);
        out.push_str(self.preamble);
        out.push('\n');
        for (i, section) in self.sections.iter().enumerate() {
            out.push_str(&format!(
                "{}. **{}**: {}\n",
                i + 1,
                section.heading,
                section.guidance
            ));
        }
        out.push_str("\n**Formatting:**\n");
        for rule in self.format_rules {
            out.push_str("- ");
            out.push_str(rule);
            out.push('\n');
        }
        out
    }

    /// Section headings in required order.
    pub fn headings(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.sections.iter().map(|s| s.heading)
    }
}
