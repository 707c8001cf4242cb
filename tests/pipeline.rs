use std::{path::Path, sync::Arc};

use vecdb::{
    Chunker, ChunkerConfig, Document, DocumentSource, Error, HybridRetriever,
    LexicalRetriever, Metadata, MetadataValue, Retriever, VectorDb,
    VectorDbBuilder,
    adapters::{TextFileAdapter, load_qa_dataset_from_csv},
    embedding::{EmbeddingBackend, HashingEmbedder},
    lexical_index::Preprocessor,
    retrieval::VectorRetriever,
};

const FAQ: &str = "\
質問,回答,カテゴリ
ベクトルデータベースとは何ですか？,ベクトルデータベースは埋め込みベクトルを保存して類似検索に使うデータベースです。,データベース
LangChainとは何ですか？,LangChainは大規模言語モデルを使ったアプリケーション開発のためのライブラリです。,ライブラリ
埋め込みモデルとは何ですか？,埋め込みモデルはテキストを数値の配列に変換するモデルです。,モデル
チャンク分割はなぜ必要ですか？,長い文書を小さなチャンクに分割すると検索の精度が上がります。,前処理
";

fn embedder() -> Arc<HashingEmbedder> {
    Arc::new(HashingEmbedder::new(1024).unwrap())
}

fn faq_documents(dir: &Path) -> Vec<Document> {
    let path = dir.join("faq.csv");
    std::fs::write(&path, FAQ).unwrap();
    load_qa_dataset_from_csv(&path, "質問", "回答", &["カテゴリ".to_string()], true)
}

fn english_corpus() -> Vec<Document> {
    [
        ("rust.txt", "the borrow checker enforces ownership and lifetimes"),
        ("bread.txt", "sourdough bread needs a starter and a long proof"),
        ("search.txt", "bm25 ranks documents by term frequency"),
        ("garden.txt", "tomatoes grow best in full sun"),
        ("cats.txt", "cats sleep for most of the day"),
    ]
    .into_iter()
    .map(|(source, text)| Document::new(text).with_metadata("source", source))
    .collect()
}

fn pairs(results: Vec<vecdb::RetrievedDocument>) -> Vec<(String, Metadata)> {
    results.into_iter().map(|r| r.into_pair()).collect()
}

#[test]
fn query_returns_at_most_k_chunks_of_the_corpus() {
    let docs = english_corpus();
    let chunker = Chunker::new(ChunkerConfig::new(24, 6).unwrap()).unwrap();
    let mut db = VectorDb::new(embedder(), Some(chunker));
    db.build_from_documents(&docs).unwrap();

    for k in [1, 3, 50] {
        let results = db.query("ownership rules", k).unwrap();
        assert!(results.len() <= k);
        for (content, metadata) in &results {
            let source = metadata["source"].as_str().unwrap();
            let parent = docs.iter().find(|d| d.source() == Some(source)).unwrap();
            assert!(parent.content.contains(content.as_str()));
        }
    }
}

#[test]
fn saved_index_answers_like_the_original() {
    let tmp = tempfile::tempdir().unwrap();
    let index_dir = tmp.path().join("nested").join("index");
    let db = VectorDbBuilder::new()
        .with_embedder(embedder())
        .build(&english_corpus())
        .unwrap();
    db.save(&index_dir).unwrap();

    let loaded = VectorDbBuilder::new()
        .with_embedder(embedder())
        .load(&index_dir)
        .unwrap();
    for query in ["sourdough", "term frequency", "sleepy cats"] {
        assert_eq!(loaded.query(query, 3).unwrap(), db.query(query, 3).unwrap());
    }
}

#[test]
fn empty_build_queries_empty() {
    let db = VectorDbBuilder::new()
        .with_backend(EmbeddingBackend::Hashing)
        .build(&[])
        .unwrap();
    assert!(db.query("anything", 5).unwrap().is_empty());
}

#[test]
fn operations_before_build_are_state_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let db = VectorDb::new(embedder(), None);
    assert!(matches!(db.query("x", 1), Err(Error::State(_))));
    assert!(matches!(db.save(tmp.path()), Err(Error::State(_))));
}

#[test]
fn loading_a_missing_index_is_a_load_error() {
    let tmp = tempfile::tempdir().unwrap();
    let mut db = VectorDb::new(embedder(), None);
    assert!(matches!(db.load(&tmp.path().join("none")), Err(Error::Load(_))));
}

fn hybrid_parts(docs: &[Document]) -> (VectorRetriever, LexicalRetriever) {
    let mut db = VectorDb::new(embedder(), None);
    db.build_from_documents(docs).unwrap();
    let vector = db.into_retriever().unwrap();
    let lexical =
        LexicalRetriever::new(docs.to_vec(), Preprocessor::lowercase()).unwrap();
    (vector, lexical)
}

#[test]
fn hybrid_with_vector_weight_only_matches_vector_retriever() {
    let docs = english_corpus();
    let (vector, _) = hybrid_parts(&docs);
    let (hybrid_vector, lexical) = hybrid_parts(&docs);
    let hybrid = HybridRetriever::new(hybrid_vector, lexical, Some([1.0, 0.0])).unwrap();

    for query in ["ownership", "bread starter", "documents"] {
        assert_eq!(
            pairs(hybrid.retrieve(query, 3).unwrap()),
            pairs(vector.retrieve(query, 3).unwrap())
        );
    }
}

#[test]
fn hybrid_with_lexical_weight_only_matches_lexical_retriever() {
    let docs = english_corpus();
    let (_, lexical) = hybrid_parts(&docs);
    let (vector, hybrid_lexical) = hybrid_parts(&docs);
    let hybrid = HybridRetriever::new(vector, hybrid_lexical, Some([0.0, 1.0])).unwrap();

    for query in ["ownership", "bread starter", "the"] {
        assert_eq!(
            pairs(hybrid.retrieve(query, 3).unwrap()),
            pairs(lexical.retrieve(query, 3).unwrap())
        );
    }
}

#[test]
fn hybrid_keeps_chunks_that_share_text() {
    let docs: Vec<Document> = [
        ("a.txt", "same text here"),
        ("b.txt", "same text here"),
        ("c.txt", "other words"),
    ]
    .into_iter()
    .map(|(source, text)| Document::new(text).with_metadata("source", source))
    .collect();

    for weights in [[1.0, 0.0], [0.0, 1.0]] {
        let (vector, lexical) = hybrid_parts(&docs);
        let expected = if weights[0] > 0.0 {
            pairs(vector.retrieve("same text", 3).unwrap())
        } else {
            pairs(lexical.retrieve("same text", 3).unwrap())
        };
        let (vector, lexical) = hybrid_parts(&docs);
        let hybrid = HybridRetriever::new(vector, lexical, Some(weights)).unwrap();
        assert_eq!(pairs(hybrid.retrieve("same text", 3).unwrap()), expected);
    }
}

#[test]
fn hybrid_rejects_bad_weights() {
    let (vector, lexical) = hybrid_parts(&english_corpus());
    let err = HybridRetriever::new(vector, lexical, Some([-1.0, 1.0])).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn lexical_prefers_the_matching_chunk() {
    let retriever = LexicalRetriever::new(
        vec![Document::new("cat sat mat"), Document::new("dog ran far")],
        Preprocessor::whitespace(),
    )
    .unwrap();
    let results = retriever.retrieve("cat", 2).unwrap();
    assert_eq!(results[0].content, "cat sat mat");
    if let Some(second) = results.get(1) {
        assert!(results[0].score > second.score);
    }
}

#[test]
fn japanese_question_finds_its_answer() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = faq_documents(tmp.path());
    assert_eq!(docs.len(), 4);

    let mut db = VectorDb::new(embedder(), None);
    db.build_from_documents(&docs).unwrap();
    let results = db.query("ベクトルデータベースは何に使うのですか", 1).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].1["カテゴリ"],
        MetadataValue::from("データベース")
    );

    let lexical =
        LexicalRetriever::new(docs.clone(), Preprocessor::char_ngrams(2)).unwrap();
    let hybrid =
        HybridRetriever::new(db.into_retriever().unwrap(), lexical, None).unwrap();
    let results = hybrid.retrieve("チャンクに分割する理由", 1).unwrap();
    assert_eq!(results[0].metadata["カテゴリ"], MetadataValue::from("前処理"));
}

#[test]
fn text_directory_to_saved_index() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("docs");
    std::fs::create_dir(&input).unwrap();
    for (name, text) in [
        ("rust.txt", "ownership and borrowing keep memory safe"),
        ("tea.txt", "green tea is steeped at a low temperature"),
        ("skip.md", "markdown is not read"),
    ] {
        std::fs::write(input.join(name), text).unwrap();
    }

    let docs = TextFileAdapter::new(&input).get_documents();
    assert_eq!(docs.len(), 2);

    let db = VectorDbBuilder::new()
        .with_backend(EmbeddingBackend::Hashing)
        .with_chunker(ChunkerConfig::new(1000, 200).unwrap())
        .build(&docs)
        .unwrap();
    let out = tmp.path().join("index");
    db.save(&out).unwrap();

    let retriever =
        VectorRetriever::open(&out, Arc::new(HashingEmbedder::default())).unwrap();
    let results = retriever.get_relevant_documents("steeped tea", 1).unwrap();
    assert_eq!(results[0].1["filename"], MetadataValue::from("tea.txt"));
}
