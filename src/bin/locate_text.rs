//! CLI tool for locating a quoted snippet in a PDF

use pdf_locator::{find_text_in_pdf_mem_with_config, LocatorConfig, PdfError, SelectionPolicy};
use std::env;
use std::fs;
use std::process;
use std::time::Instant;

fn error_json(e: &dyn std::fmt::Display) -> serde_json::Value {
    serde_json::json!({ "error": e.to_string() })
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <pdf_file> <search_text> [--json] [--best-score]", args[0]);
        eprintln!();
        eprintln!("Finds the text block that best matches the search text and");
        eprintln!("prints a padded bounding box for highlighting it.");
        process::exit(1);
    }

    let pdf_path = &args[1];
    let search_text = &args[2];
    let flags = &args[3..];
    let json_output = flags.iter().any(|a| a == "--json");

    let config = LocatorConfig {
        selection: if flags.iter().any(|a| a == "--best-score") {
            SelectionPolicy::HighestScore
        } else {
            SelectionPolicy::LastAboveThreshold
        },
        ..Default::default()
    };

    let start = Instant::now();

    let result = fs::read(pdf_path)
        .map_err(PdfError::from)
        .and_then(|buffer| find_text_in_pdf_mem_with_config(&buffer, search_text, &config));

    match result {
        Ok(result) => {
            if json_output {
                match serde_json::to_string(&result) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        println!("{}", error_json(&e));
                        process::exit(1);
                    }
                }
            } else {
                println!("Snippet Location");
                println!("================");
                println!("File: {}", pdf_path);
                println!("Search: {:?}", search_text);
                println!();
                if result.is_fallback() {
                    println!("No block reached similarity {}.", config.threshold);
                    println!("Returning the default region.");
                    println!();
                }
                println!("Page: {}", result.page);
                println!(
                    "Box: x0={:.1} y0={:.1} width={:.1} height={:.1}",
                    result.coordinates.x0,
                    result.coordinates.y0,
                    result.coordinates.width,
                    result.coordinates.height
                );
                println!("Similarity: {:.1}", result.similarity);
                println!("Matched text: {:?}", result.matched_text);
                println!();
                println!("Search time: {}ms", start.elapsed().as_millis());
            }
        }
        Err(e) => {
            if json_output {
                println!("{}", error_json(&e));
            } else {
                eprintln!("Error: {}", e);
            }
            process::exit(1);
        }
    }
}
