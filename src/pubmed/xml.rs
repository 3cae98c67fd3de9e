//! XML parsing for efetch article records and PMC full-text documents

use roxmltree::{Document, Node};

use crate::pubmed::models::Article;

/// Parse an efetch `PubmedArticleSet` response into article records.
/// Malformed XML yields an empty list, not an error.
pub fn parse_pubmed_articles(xml: &str) -> Vec<Article> {
    let doc = match Document::parse(xml) {
        Ok(doc) => doc,
        Err(_) => return Vec::new(),
    };

    let mut articles = Vec::new();

    for node in doc.descendants().filter(|n| n.has_tag_name("PubmedArticle")) {
        let Some(medline) = child(node, "MedlineCitation") else {
            continue;
        };
        let pmid = child(medline, "PMID").map(deep_text).unwrap_or_default();

        let Some(article_elem) = child(medline, "Article") else {
            continue;
        };

        let title = child(article_elem, "ArticleTitle")
            .map(deep_text)
            .unwrap_or_default();

        let abstract_text = child(article_elem, "Abstract")
            .map(|abstract_elem| {
                abstract_elem
                    .children()
                    .filter(|c| c.has_tag_name("AbstractText"))
                    .map(|at| {
                        let text = deep_text(at);
                        match at.attribute("Label") {
                            Some(label) if !label.is_empty() => format!("{label}: {text}"),
                            _ => text,
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n\n")
            })
            .unwrap_or_default();

        let mut journal = String::new();
        let mut pub_date = String::new();
        if let Some(journal_elem) = child(article_elem, "Journal") {
            journal = child(journal_elem, "Title").map(deep_text).unwrap_or_default();
            if let Some(pub_date_elem) = child(journal_elem, "JournalIssue")
                .and_then(|issue| child(issue, "PubDate"))
            {
                let year = child(pub_date_elem, "Year").map(deep_text).unwrap_or_default();
                pub_date = match child(pub_date_elem, "Month")
                    .map(deep_text)
                    .filter(|m| !m.is_empty())
                {
                    Some(month) => format!("{month} {year}"),
                    None => year,
                };
            }
        }

        let authors = child(article_elem, "AuthorList")
            .map(|list| {
                list.children()
                    .filter(|c| c.has_tag_name("Author"))
                    .filter_map(|author| {
                        let last = child(author, "LastName").map(deep_text)?;
                        Some(
                            match child(author, "ForeName")
                                .map(deep_text)
                                .filter(|f| !f.is_empty())
                            {
                                Some(fore) => format!("{fore} {last}"),
                                None => last,
                            },
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        let keywords = child(medline, "KeywordList")
            .map(|list| collect_texts(list, "Keyword"))
            .unwrap_or_default();

        let mesh_terms = child(medline, "MeshHeadingList")
            .map(|list| {
                list.children()
                    .filter(|c| c.has_tag_name("MeshHeading"))
                    .filter_map(|heading| child(heading, "DescriptorName"))
                    .map(deep_text)
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let pub_types = child(article_elem, "PublicationTypeList")
            .map(|list| collect_texts(list, "PublicationType"))
            .unwrap_or_default();

        let doi = child(node, "PubmedData")
            .and_then(|data| child(data, "ArticleIdList"))
            .and_then(|ids| {
                ids.children()
                    .find(|c| c.has_tag_name("ArticleId") && c.attribute("IdType") == Some("doi"))
            })
            .map(deep_text)
            .unwrap_or_default();

        articles.push(Article {
            pmid,
            title,
            abstract_text,
            full_text: None,
            authors,
            journal,
            pub_date,
            doi,
            keywords,
            mesh_terms,
            pub_types,
            pmcid: None,
        });
    }

    articles
}

/// Extract the downloadable article XML link from an OA service response.
/// An `<error>` element or a missing link means the article is not open
/// access; both are absence, not failure.
pub fn parse_oa_package_link(xml: &str) -> Option<String> {
    let doc = Document::parse(xml).ok()?;

    if doc.descendants().any(|n| n.has_tag_name("error")) {
        return None;
    }

    let link = doc
        .descendants()
        .find(|n| n.has_tag_name("link") && n.attribute("format") == Some("xml"))
        .or_else(|| {
            doc.descendants()
                .find(|n| n.has_tag_name("link") && n.attribute("format") == Some("tgz"))
        })?;

    link.attribute("href").map(str::to_string)
}

/// Flatten a PMC article XML document into readable text: the abstract first,
/// then each body section with its title upper-cased as a header.
pub fn parse_pmc_article_text(xml: &str) -> Option<String> {
    let doc = Document::parse(xml).ok()?;

    let mut parts = Vec::new();

    if let Some(abstract_node) = doc.descendants().find(|n| n.has_tag_name("abstract")) {
        let text = deep_text(abstract_node);
        if !text.is_empty() {
            parts.push(format!("ABSTRACT:\n{text}"));
        }
    }

    if let Some(body) = doc.descendants().find(|n| n.has_tag_name("body")) {
        for node in body.descendants() {
            if node.has_tag_name("title") && node.parent().is_some_and(|p| p.has_tag_name("sec")) {
                let title = deep_text(node);
                if !title.is_empty() {
                    parts.push(format!("\n{}:", title.to_uppercase()));
                }
            } else if node.has_tag_name("p") {
                let text = deep_text(node);
                if !text.is_empty() {
                    parts.push(text);
                }
            }
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.has_tag_name(name))
}

/// All text content of an element, including nested markup, trimmed.
fn deep_text(node: Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

fn collect_texts(list: Node, name: &str) -> Vec<String> {
    list.children()
        .filter(|c| c.has_tag_name(name))
        .map(deep_text)
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EFETCH_FIXTURE: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>12345678</PMID>
      <Article>
        <Journal>
          <Title>The Lancet</Title>
          <JournalIssue>
            <PubDate><Year>2023</Year><Month>Mar</Month></PubDate>
          </JournalIssue>
        </Journal>
        <ArticleTitle>Outcomes of <i>early</i> intervention.</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND">Context matters.</AbstractText>
          <AbstractText Label="RESULTS">It worked.</AbstractText>
        </Abstract>
        <AuthorList>
          <Author><LastName>Smith</LastName><ForeName>Jane</ForeName></Author>
          <Author><LastName>Doe</LastName></Author>
        </AuthorList>
        <PublicationTypeList>
          <PublicationType>Randomized Controlled Trial</PublicationType>
        </PublicationTypeList>
      </Article>
      <KeywordList>
        <Keyword>sepsis</Keyword>
        <Keyword>mortality</Keyword>
      </KeywordList>
      <MeshHeadingList>
        <MeshHeading><DescriptorName>Sepsis</DescriptorName></MeshHeading>
      </MeshHeadingList>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">12345678</ArticleId>
        <ArticleId IdType="doi">10.1000/test.2023</ArticleId>
      </ArticleIdList>
    </PubmedData>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_efetch_article() {
        let articles = parse_pubmed_articles(EFETCH_FIXTURE);
        assert_eq!(articles.len(), 1);

        let article = &articles[0];
        assert_eq!(article.pmid, "12345678");
        assert_eq!(article.title, "Outcomes of early intervention.");
        assert_eq!(
            article.abstract_text,
            "BACKGROUND: Context matters.\n\nRESULTS: It worked."
        );
        assert_eq!(article.journal, "The Lancet");
        assert_eq!(article.pub_date, "Mar 2023");
        assert_eq!(article.authors, vec!["Jane Smith", "Doe"]);
        assert_eq!(article.keywords, vec!["sepsis", "mortality"]);
        assert_eq!(article.mesh_terms, vec!["Sepsis"]);
        assert_eq!(article.pub_types, vec!["Randomized Controlled Trial"]);
        assert_eq!(article.doi, "10.1000/test.2023");
        assert!(article.full_text.is_none());
    }

    #[test]
    fn test_parse_malformed_efetch_xml() {
        assert!(parse_pubmed_articles("<broken").is_empty());
        assert!(parse_pubmed_articles("<Empty/>").is_empty());
    }

    #[test]
    fn test_parse_oa_link_prefers_xml_format() {
        let xml = r#"<OA><records><record>
            <link format="tgz" href="ftp://example/pkg.tgz"/>
            <link format="xml" href="https://example/article.xml"/>
        </record></records></OA>"#;
        assert_eq!(
            parse_oa_package_link(xml).as_deref(),
            Some("https://example/article.xml")
        );
    }

    #[test]
    fn test_parse_oa_link_error_means_absent() {
        let xml = r#"<OA><error code="idIsNotOpenAccess">not OA</error></OA>"#;
        assert!(parse_oa_package_link(xml).is_none());
    }

    #[test]
    fn test_parse_pmc_article_text() {
        let xml = r#"<article>
          <front><abstract><p>Summary of the study.</p></abstract></front>
          <body>
            <sec>
              <title>Methods</title>
              <p>We enrolled patients.</p>
              <p>Follow-up lasted a year.</p>
            </sec>
            <sec>
              <title>Results</title>
              <p>Mortality fell.</p>
            </sec>
          </body>
        </article>"#;

        let text = parse_pmc_article_text(xml).unwrap();
        assert!(text.starts_with("ABSTRACT:\nSummary of the study."));
        assert!(text.contains("\nMETHODS:"));
        assert!(text.contains("We enrolled patients."));
        assert!(text.contains("\nRESULTS:"));
        assert!(text.contains("Mortality fell."));
    }

    #[test]
    fn test_parse_pmc_article_text_empty_document() {
        assert!(parse_pmc_article_text("<article/>").is_none());
        assert!(parse_pmc_article_text("not xml").is_none());
    }
}
