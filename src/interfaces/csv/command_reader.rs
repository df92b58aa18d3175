use crate::domain::directory::UserId;
use crate::error::{Result, ServiceError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    CreateAppointment,
    CreateRsa,
    UpdateAppointment,
    Approve,
    Reject,
    Cancel,
    AssignManager,
    AssignMechanic,
    CreateJobCard,
    Reassign,
    AddItem,
    RemoveItem,
    AddEvidence,
    Start,
    Complete,
    CancelJob,
    Rate,
    SetPrice,
    Invoice,
    PayOrder,
    Verify,
    Settle,
    SimulatePay,
}

/// One row of a command script.
///
/// Columns are shared across commands; each command reads the ones it needs:
/// `id` is the primary target, `ref` a secondary reference, `text` free
/// form input.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct CommandRecord {
    pub command: CommandKind,
    pub id: Option<u64>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub actor: UserId,
    pub date: Option<NaiveDate>,
    pub text: Option<String>,
    pub amount: Option<Decimal>,
    pub quantity: Option<u32>,
    pub signature: Option<String>,
}

/// Reads commands from a CSV source.
///
/// Whitespace is trimmed and short rows are accepted, so trailing empty
/// columns can be left out.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes commands; a malformed row yields an error and the
    /// stream continues.
    pub fn commands(self) -> impl Iterator<Item = Result<CommandRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(ServiceError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HEADER: &str = "command,id,ref,actor,date,text,amount,quantity,signature\n";

    #[test]
    fn test_reader_valid_stream() {
        let data = format!(
            "{HEADER}create_appointment, 100, , 1, 2999-01-01, Brakes squeal\n\
             create_job_card, 1, 30, 20, , 1:2, 50.00\n\
             add_item, 1, 2, 20, , , , 3"
        );
        let commands: Vec<_> = CommandReader::new(data.as_bytes())
            .commands()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].command, CommandKind::CreateAppointment);
        assert_eq!(commands[0].date, NaiveDate::from_ymd_opt(2999, 1, 1));
        assert_eq!(commands[0].reference, None);
        assert_eq!(commands[0].text.as_deref(), Some("Brakes squeal"));
        assert_eq!(commands[1].reference.as_deref(), Some("30"));
        assert_eq!(commands[1].amount, Some(dec!(50.00)));
        assert_eq!(commands[2].quantity, Some(3));
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = format!("{HEADER}teleport, 1, , 1\napprove, 1, , 20");
        let results: Vec<Result<CommandRecord>> =
            CommandReader::new(data.as_bytes()).commands().collect();

        assert!(matches!(results[0], Err(ServiceError::Csv(_))));
        assert_eq!(results[1].as_ref().unwrap().command, CommandKind::Approve);
    }
}
