use pdf_locator::extract_pages;
use std::env;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: debug_blocks <pdf_path> [max_page | min-max]");
        std::process::exit(1);
    }

    let range = args.get(2).map(|s| s.as_str()).unwrap_or("1-3");
    let (min_page, max_page) = if let Some((a, b)) = range.split_once('-') {
        (a.parse().unwrap_or(1), b.parse().unwrap_or(3))
    } else {
        (1, range.parse().unwrap_or(3))
    };

    let pages = match extract_pages(&args[1]) {
        Ok(pages) => pages,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    for (index, page) in pages.iter().enumerate() {
        let page_num = index + 1;
        if page_num < min_page || page_num > max_page {
            continue;
        }
        println!(
            "=== PAGE {} ({:.1} x {:.1}, {} blocks) ===",
            page_num,
            page.geometry.width,
            page.geometry.height,
            page.blocks.len()
        );
        for block in &page.blocks {
            println!(
                "  [{:7.1} {:7.1} {:7.1} {:7.1}] {:?}",
                block.rect.x0, block.rect.y0, block.rect.x1, block.rect.y1, block.text
            );
        }
        println!();
    }
}
