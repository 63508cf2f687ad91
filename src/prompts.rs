// Prompt templates for both pipelines.

use crate::analyst::AnalystProfile;
use crate::constants::{DATASET_END, DATASET_START};

pub fn summary_prompt(campaign_text: &str) -> String {
    format!(
        "You are an expert in summarizing advocacy campaigns.\n\
        Analyze the following campaign text and provide a summary and its key points.\n\
        Leave out details and text that are not relevant to the campaign's main message.\n\
        Here is the campaign text:\n\
        \"\"\"{campaign_text}\"\"\"\n"
    )
}

pub fn advocacy_prompt(campaign_text: &str, constituent_name: &str, constituency: &str) -> String {
    format!(
        "You are a constituent named {constituent_name} from {constituency}.\n\
        You are writing a passionate, respectful email to your local government office \
        about this advocacy campaign:\n\n\
        \"\"\"{campaign_text}\"\"\"\n\n\
        Write a compelling and personal message asking them to take action.\n"
    )
}

/// Setup turn for an analyst chat: the profile brief, then the dataset fenced
/// by the start/end markers, then the instruction to wait for questions.
pub fn analyst_setup_prompt(profile: AnalystProfile, dataset_csv: &str) -> String {
    format!(
        "{brief}\n\n\
        Here is the dataset:\n\
        {fenced}\n\n\
        Acknowledge that you have received and understood the data. \
        Then, wait for the user's question.\n",
        brief = profile.brief(),
        fenced = fence_dataset(dataset_csv),
    )
}

fn fence_dataset(dataset_csv: &str) -> String {
    let separator = if dataset_csv.ends_with('\n') { "" } else { "\n" };
    format!("{DATASET_START}\n{dataset_csv}{separator}{DATASET_END}")
}
