use super::{QueueStatus, TileJob, TileQueue};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamPendingReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client};
use tileforge_core::Tile;

const DATA_FIELD: &str = "data";

/// A Redis-stream work queue with a consumer group.
///
/// `push` is XADD, `pull` is XREADGROUP and `delete` is XACK plus XDEL, so a
/// consumer that dies mid-job leaves it in the group's pending list for
/// redelivery.
pub struct RedisQueue {
	connection: MultiplexedConnection,
	stream: String,
	group: String,
	consumer: String,
	block_ms: usize,
}

impl RedisQueue {
	/// Connect and create the stream and consumer group if missing.
	pub async fn connect(
		url: &str,
		stream: impl Into<String>,
		group: impl Into<String>,
		consumer: impl Into<String>,
		block_ms: usize,
	) -> Result<RedisQueue> {
		let stream = stream.into();
		let group = group.into();
		let client = Client::open(url).context("opening redis client")?;
		let mut connection = client
			.get_multiplexed_async_connection()
			.await
			.context("connecting to redis")?;

		// Deliver entries added before the group existed too, hence "0".
		let created: redis::RedisResult<()> = redis::cmd("XGROUP")
			.arg("CREATE")
			.arg(&stream)
			.arg(&group)
			.arg("0")
			.arg("MKSTREAM")
			.query_async(&mut connection)
			.await;
		if let Err(error) = created {
			if error.code() != Some("BUSYGROUP") {
				return Err(error).context("creating consumer group");
			}
		}

		Ok(RedisQueue {
			connection,
			stream,
			group,
			consumer: consumer.into(),
			block_ms,
		})
	}
}

#[async_trait]
impl TileQueue for RedisQueue {
	async fn push(&self, tile: &Tile) -> Result<()> {
		let job = serde_json::to_string(&TileJob::from_tile(tile))?;
		let mut connection = self.connection.clone();
		let entry_id: String = connection
			.xadd(&self.stream, "*", &[(DATA_FIELD, job)])
			.await
			.context("enqueueing job")?;
		debug!("queued {} as {entry_id}", tile.coord);
		Ok(())
	}

	async fn pull(&self, max: usize) -> Result<Vec<Tile>> {
		let options = StreamReadOptions::default()
			.group(&self.group, &self.consumer)
			.count(max)
			.block(self.block_ms);
		let mut connection = self.connection.clone();
		let reply: StreamReadReply = connection
			.xread_options(&[&self.stream], &[">"], &options)
			.await
			.context("pulling jobs")?;

		let mut tiles = Vec::new();
		for key in reply.keys {
			for entry in key.ids {
				let Some(value) = entry.map.get(DATA_FIELD) else {
					warn!("queue entry {} has no {DATA_FIELD} field, dropping it", entry.id);
					let _: u64 = connection.xack(&self.stream, &self.group, &[&entry.id]).await?;
					continue;
				};
				let data: Vec<u8> = redis::from_redis_value(value).context("reading job payload")?;
				let job: TileJob = serde_json::from_slice(&data).context("decoding job payload")?;
				tiles.push(job.into_tile(entry.id));
			}
		}
		Ok(tiles)
	}

	async fn delete(&self, tile: &Tile) -> Result<()> {
		let Some(id) = super::receipt(tile) else {
			bail!("tile {} carries no queue receipt", tile.coord);
		};
		let mut connection = self.connection.clone();
		let _: u64 = connection
			.xack(&self.stream, &self.group, &[id])
			.await
			.context("acknowledging job")?;
		let _: u64 = connection.xdel(&self.stream, &[id]).await.context("deleting job")?;
		Ok(())
	}

	async fn status(&self) -> Result<QueueStatus> {
		let mut connection = self.connection.clone();
		let length: u64 = connection.xlen(&self.stream).await.context("reading stream length")?;
		let pending: StreamPendingReply = connection
			.xpending(&self.stream, &self.group)
			.await
			.context("reading pending jobs")?;
		let in_flight = pending.count() as u64;
		Ok(QueueStatus {
			queued: length.saturating_sub(in_flight),
			in_flight,
		})
	}
}
