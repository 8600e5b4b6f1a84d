//! Document display for the CLI: `legally get` and `legally list`.

use crate::models::Document;

/// Print a full document: metadata, body, and chunks.
pub fn print_document(doc: &Document) {
    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!("title:        {}", doc.title);
    println!("category:     {}", doc.category);
    println!("status:       {}", doc.status);
    if !doc.source.is_empty() {
        println!("source:       {}", doc.source);
    }
    if !doc.filename.is_empty() {
        println!("filename:     {}", doc.filename);
    }
    if !doc.owner_id.is_empty() {
        println!("owner:        {}", doc.owner_id);
    }
    println!("created_at:   {}", format_ts_iso(doc.created_at));
    println!("updated_at:   {}", format_ts_iso(doc.updated_at));
    match &doc.embedding {
        Some(v) => println!("embedding:    {} dims", v.len()),
        None => println!("embedding:    none"),
    }
    println!();

    println!("--- Content ---");
    println!("{}", doc.content);
    println!();

    println!("--- Chunks ({}) ---", doc.chunks.len());
    for chunk in &doc.chunks {
        let embedded = if chunk.embedding.is_some() {
            ""
        } else {
            " (no embedding)"
        };
        println!(
            "[chunk {}] {}..{}{}",
            chunk.chunk_index, chunk.start_offset, chunk.end_offset, embedded
        );
        println!("{}", chunk.content);
        println!();
    }
}

/// Print one line per document.
pub fn print_list(docs: &[Document]) {
    if docs.is_empty() {
        println!("No documents.");
        return;
    }

    println!(
        "{:<36}  {:<10}  {:<22}  {:<16}  TITLE",
        "ID", "STATUS", "CATEGORY", "CREATED"
    );
    for doc in docs {
        println!(
            "{:<36}  {:<10}  {:<22}  {:<16}  {}",
            doc.id,
            doc.status,
            doc.category,
            format_ts_short(doc.created_at),
            doc.title
        );
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn format_ts_short(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
