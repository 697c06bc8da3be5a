//! CLI tool for attaching highlight regions to a model's answers

use pdf_locator::{collate_answers_mem, AnswerSheet, LocatorConfig, PdfError, Question};
use std::env;
use std::fs;
use std::process;

fn run(pdf_path: &str, questions_path: &str, answers_path: &str) -> Result<String, PdfError> {
    let buffer = fs::read(pdf_path)?;
    let questions: Vec<Question> = serde_json::from_str(&fs::read_to_string(questions_path)?)?;
    let sheet = AnswerSheet::from_json(&fs::read_to_string(answers_path)?)?;

    let cited = collate_answers_mem(&buffer, &questions, &sheet, &LocatorConfig::default())?;
    Ok(serde_json::to_string_pretty(&cited)?)
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 4 {
        eprintln!("Usage: {} <pdf_file> <questions.json> <answers.json>", args[0]);
        eprintln!();
        eprintln!("questions.json: [{{\"key\": \"q_1\", \"text\": \"What is the lease start date?\"}}]");
        eprintln!("answers.json:   {{\"q_1\": {{\"answer\": \"...\", \"line\": \"...\"}}}}");
        process::exit(1);
    }

    match run(&args[1], &args[2], &args[3]) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
