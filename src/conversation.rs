//! One question-and-answer turn: grounding, completion, interpretation, and persistence.

use crate::completion::{ChatTurn, CompletionClient, CompletionRequest};
use crate::context::ContextAssembler;
use crate::interpret::interpret;
use crate::model::{Message, UploadedFile};
use crate::store::{GatewayError, PersistenceGateway};
use std::sync::Arc;

/// Reply used when the completion service cannot be reached or fails.
pub const COMPLETION_FAILURE_REPLY: &str =
    "Desculpe, ocorreu um erro ao se conectar com o modelo ou processar os dados.";

const EMPTY_CATALOG: &str = "Nenhum arquivo carregado ainda.";

/// Messages produced by one turn, in transcript order.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// The operator's question as persisted.
    pub user: Message,
    /// The assistant's settled reply.
    pub reply: Message,
}

/// Drives conversation turns against the catalog and transcript held by the gateway.
pub struct ConversationService {
    gateway: Arc<PersistenceGateway>,
    completion: Arc<dyn CompletionClient>,
    assembler: ContextAssembler,
    model: String,
}

impl ConversationService {
    /// Create a service answering with `model` through `completion`.
    pub fn new(
        gateway: Arc<PersistenceGateway>,
        completion: Arc<dyn CompletionClient>,
        assembler: ContextAssembler,
        model: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            completion,
            assembler,
            model: model.into(),
        }
    }

    /// Ask `question` with `transcript` as prior history.
    ///
    /// The question is written in the background while the completion runs; a failed write
    /// is logged and does not stop the turn. The reply is written only after the question's
    /// write has finished, so the stored transcript keeps conversation order. Only a failure
    /// to store the reply is returned.
    pub async fn ask(
        &self,
        transcript: &[Message],
        question: &str,
    ) -> Result<TurnOutcome, GatewayError> {
        let user = Message::user(question);
        let user_write = {
            let gateway = Arc::clone(&self.gateway);
            let message = user.clone();
            tokio::spawn(async move {
                if let Err(error) = gateway.add_message(&message).await {
                    tracing::error!(id = %message.id, error = %error, "Failed to store question");
                }
            })
        };

        let pending = Message::pending_reply();
        let catalog = match self.gateway.list_files().await {
            Ok(files) => files,
            Err(error) => {
                tracing::error!(error = %error, "Failed to load catalog; answering without files");
                Vec::new()
            }
        };

        let request = CompletionRequest {
            model: self.model.clone(),
            system_instruction: self.system_instruction(&catalog),
            history: settled_history(transcript),
            prompt: question.to_string(),
        };
        let reply = match self.completion.complete(request).await {
            Ok(raw) => {
                let interpretation = interpret(&raw);
                pending.resolve(interpretation.answer_text, interpretation.chart_data)
            }
            Err(error) => {
                tracing::error!(error = %error, "Completion failed");
                pending.resolve(COMPLETION_FAILURE_REPLY, None)
            }
        };

        if let Err(error) = user_write.await {
            tracing::error!(error = %error, "Question write task aborted");
        }
        self.gateway.add_message(&reply).await?;
        tracing::info!(
            files = catalog.len(),
            chart = reply.chart_data.is_some(),
            backend = %self.gateway.current_backend(),
            "Turn completed"
        );

        Ok(TurnOutcome { user, reply })
    }

    fn system_instruction(&self, catalog: &[UploadedFile]) -> String {
        let context = self.assembler.build_context(catalog);
        let context = if context.is_empty() {
            EMPTY_CATALOG
        } else {
            context.as_str()
        };
        system_instruction(context)
    }
}

fn settled_history(transcript: &[Message]) -> Vec<ChatTurn> {
    transcript
        .iter()
        .filter(|message| !message.pending)
        .map(|message| ChatTurn {
            role: message.role,
            text: message.text.clone(),
        })
        .collect()
}

fn system_instruction(context: &str) -> String {
    format!(
        r#"Você é o Gonçalinho, analista de dados especializado em municípios brasileiros e em indicadores de saúde e sociais.

DADOS DOS ARQUIVOS CARREGADOS PELO USUÁRIO:
{context}

REGRAS PARA A ANÁLISE:
1. Os dados acima são a única fonte. Cruze arquivos quando preciso (por exemplo, população de um e casos de outro).
2. Em geral cada linha é um município ou entidade e as colunas são meses ou anos.
3. Corrija mentalmente problemas de codificação como "So" por "São" e "Gonalo" por "Gonçalo".
4. Para totais de um ano, some todas as colunas daquele ano e mostre o cálculo de forma breve.
5. Taxas seguem (casos / população) multiplicado por 1.000 ou 100.000, conforme o indicador.
6. Se o município exato não aparecer, procure nomes parecidos.
7. Nunca invente números.

Responda de forma objetiva, sem listar valores intermediários que não foram pedidos.

GRÁFICOS:
Quando o usuário pedir um gráfico, responda APENAS com um objeto JSON, sem texto antes ou depois e sem blocos de código:
{{
  "message": "Texto explicando o gráfico",
  "chart": {{
    "type": "bar",
    "title": "Título do gráfico",
    "description": "Descrição breve (opcional)",
    "data": [{{"label": "Jan/25", "Série A": 2, "Série B": 5}}]
  }}
}}
O campo "type" aceita "bar", "line", "pie" ou "area". Use "label" para o eixo X e nomes descritivos para as séries, ou "value" quando houver uma só.

Sem pedido de gráfico, responda em markdown e não retorne JSON."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionError;
    use crate::model::{ChartKind, ContentKind, FileMetadata, Role};
    use crate::store::{LocalStore, StorageBackend, StorageError};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct ScriptedCompletion {
        reply: Result<String, String>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedCompletion {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("connection refused".into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedCompletion {
        async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
            self.seen.lock().await.push(request);
            self.reply
                .clone()
                .map_err(CompletionError::ProviderUnavailable)
        }
    }

    struct DownBackend;

    #[async_trait]
    impl StorageBackend for DownBackend {
        async fn list_files(&self) -> Result<Vec<UploadedFile>, StorageError> {
            Err(StorageError::LockPoisoned)
        }
        async fn add_file(&self, _file: &UploadedFile) -> Result<(), StorageError> {
            Err(StorageError::LockPoisoned)
        }
        async fn delete_file(&self, _id: &str) -> Result<(), StorageError> {
            Err(StorageError::LockPoisoned)
        }
        async fn list_messages(&self) -> Result<Vec<Message>, StorageError> {
            Err(StorageError::LockPoisoned)
        }
        async fn add_message(&self, _message: &Message) -> Result<(), StorageError> {
            Err(StorageError::LockPoisoned)
        }
    }

    fn local_gateway() -> Arc<PersistenceGateway> {
        Arc::new(PersistenceGateway::new(
            Arc::new(LocalStore::in_memory().expect("remote")),
            Arc::new(LocalStore::in_memory().expect("local")),
        ))
    }

    fn service(gateway: Arc<PersistenceGateway>, completion: Arc<ScriptedCompletion>) -> ConversationService {
        ConversationService::new(gateway, completion, ContextAssembler::default(), "llama3.1")
    }

    #[tokio::test]
    async fn turn_persists_question_then_reply() {
        let gateway = local_gateway();
        gateway
            .add_file(&UploadedFile::new(
                "dengue.csv",
                ContentKind::TabularText,
                "Município,2022\nSão Gonçalo,42".into(),
                FileMetadata::default(),
            ))
            .await
            .expect("file");
        let completion = ScriptedCompletion::replying("O total foi 42.");

        let outcome = service(gateway.clone(), completion.clone())
            .ask(&[], "Qual o total?")
            .await
            .expect("turn");

        assert_eq!(outcome.user.text, "Qual o total?");
        assert_eq!(outcome.reply.role, Role::Assistant);
        assert_eq!(outcome.reply.text, "O total foi 42.");
        assert!(!outcome.reply.pending);

        let stored = gateway.list_messages().await.expect("messages");
        assert_eq!(stored, vec![outcome.user, outcome.reply]);

        let seen = completion.seen.lock().await;
        assert!(seen[0].system_instruction.contains("--- INÍCIO DO ARQUIVO: dengue.csv ---"));
        assert_eq!(seen[0].prompt, "Qual o total?");
        assert_eq!(seen[0].model, "llama3.1");
    }

    #[tokio::test]
    async fn chart_replies_carry_chart_data() {
        let completion = ScriptedCompletion::replying(
            r#"{"message":"Veja o gráfico","chart":{"type":"line","title":"Casos","data":[{"label":"Jan","value":1}]}}"#,
        );
        let outcome = service(local_gateway(), completion)
            .ask(&[], "Faça um gráfico")
            .await
            .expect("turn");

        assert_eq!(outcome.reply.text, "Veja o gráfico");
        assert_eq!(outcome.reply.chart_data.expect("chart").kind(), Some(ChartKind::Line));
    }

    #[tokio::test]
    async fn pending_messages_are_left_out_of_history() {
        let completion = ScriptedCompletion::replying("ok");
        let earlier = vec![
            Message::user("Primeira"),
            Message::pending_reply().resolve("Resposta", None),
            Message::pending_reply(),
        ];

        service(local_gateway(), completion.clone())
            .ask(&earlier, "Segunda")
            .await
            .expect("turn");

        let seen = completion.seen.lock().await;
        let history: Vec<_> = seen[0].history.iter().map(|turn| turn.text.as_str()).collect();
        assert_eq!(history, ["Primeira", "Resposta"]);
        assert!(seen[0].system_instruction.contains(EMPTY_CATALOG));
    }

    #[tokio::test]
    async fn completion_failure_yields_the_apology() {
        let gateway = local_gateway();
        let outcome = service(gateway.clone(), ScriptedCompletion::failing())
            .ask(&[], "Olá")
            .await
            .expect("turn");

        assert_eq!(outcome.reply.text, COMPLETION_FAILURE_REPLY);
        assert_eq!(gateway.list_messages().await.expect("messages").len(), 2);
    }

    #[tokio::test]
    async fn storage_exhaustion_surfaces_after_answering() {
        let gateway = Arc::new(PersistenceGateway::new(
            Arc::new(DownBackend),
            Arc::new(DownBackend),
        ));
        let completion = ScriptedCompletion::replying("ok");

        let error = service(gateway, completion.clone())
            .ask(&[], "Olá")
            .await
            .expect_err("nothing can be stored");

        let GatewayError::Exhausted { operation, .. } = error;
        assert_eq!(operation, "add_message");
        let seen = completion.seen.lock().await;
        assert!(seen[0].system_instruction.contains(EMPTY_CATALOG));
    }
}
