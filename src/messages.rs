//! User-facing progress and status strings.
//!
//! These are the messages a client sees on the progress stream and on a
//! failed job. Log lines stay in English regardless of [`Locale`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Language of the messages shown to the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Locale {
    En,
    #[default]
    PtBr,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::PtBr => "pt-br",
        }
    }

    pub fn queued(&self) -> &'static str {
        match self {
            Locale::En => "Waiting...",
            Locale::PtBr => "Aguardando...",
        }
    }

    pub fn starting(&self) -> &'static str {
        match self {
            Locale::En => "Starting...",
            Locale::PtBr => "Iniciando...",
        }
    }

    pub fn rasterizing(&self) -> &'static str {
        match self {
            Locale::En => "Converting PDF to images...",
            Locale::PtBr => "Convertendo PDF para imagens...",
        }
    }

    pub fn processing_page(&self, page: usize, total: Option<usize>) -> String {
        match (self, total) {
            (Locale::En, Some(t)) => format!("Processing page {page} of {t}..."),
            (Locale::En, None) => format!("Processing page {page}..."),
            (Locale::PtBr, Some(t)) => format!("Processando página {page} de {t}..."),
            (Locale::PtBr, None) => format!("Processando página {page}..."),
        }
    }

    pub fn building_workbook(&self) -> &'static str {
        match self {
            Locale::En => "Building Excel spreadsheet...",
            Locale::PtBr => "Gerando planilha Excel...",
        }
    }

    pub fn done(&self) -> &'static str {
        match self {
            Locale::En => "Done",
            Locale::PtBr => "Concluído",
        }
    }

    pub fn failed(&self) -> &'static str {
        match self {
            Locale::En => "Failed",
            Locale::PtBr => "Falha",
        }
    }

    pub fn no_table(&self) -> &'static str {
        match self {
            Locale::En => "No table found",
            Locale::PtBr => "Nenhuma tabela encontrada",
        }
    }

    /// Error text stored on a job that found no table on any page.
    pub fn no_table_error(&self) -> &'static str {
        match self {
            Locale::En => "No table found in the PDF. The AI could not identify tables in the images.",
            Locale::PtBr => {
                "Nenhuma tabela encontrada no PDF. A IA não conseguiu identificar tabelas nas imagens."
            }
        }
    }

    pub fn job_not_found(&self) -> &'static str {
        match self {
            Locale::En => "Job not found (expired or invalid)",
            Locale::PtBr => "Job não encontrado (expirado ou inválido)",
        }
    }

    pub fn not_ready(&self) -> &'static str {
        match self {
            Locale::En => "File is not ready yet",
            Locale::PtBr => "Arquivo ainda não está pronto",
        }
    }

    pub fn no_file(&self) -> &'static str {
        match self {
            Locale::En => "No file uploaded",
            Locale::PtBr => "Nenhum arquivo enviado",
        }
    }

    pub fn not_a_pdf(&self) -> &'static str {
        match self {
            Locale::En => "The file must be a PDF",
            Locale::PtBr => "O arquivo deve ser um PDF",
        }
    }

    pub fn job_id_required(&self) -> &'static str {
        match self {
            Locale::En => "jobId is required",
            Locale::PtBr => "jobId é obrigatório",
        }
    }

    /// Fallback for a failed job that carries no error text.
    pub fn processing_failed(&self) -> &'static str {
        match self {
            Locale::En => "Processing failed",
            Locale::PtBr => "Falha ao processar",
        }
    }

    pub fn provider_not_configured(&self) -> &'static str {
        match self {
            Locale::En => "Vision model provider is not configured",
            Locale::PtBr => "Provedor do modelo de visão não configurado",
        }
    }

    pub fn sheet_name(&self) -> &'static str {
        match self {
            Locale::En => "Table",
            Locale::PtBr => "Tabela",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "en" | "en-us" | "en-gb" => Ok(Locale::En),
            "pt" | "pt-br" => Ok(Locale::PtBr),
            other => Err(format!("Unsupported locale: '{other}' (expected en or pt-br)")),
        }
    }
}
